//! Interactive question loop

use crate::agent::ReasoningAgent;
use std::io::{BufRead, Write};
use tracing::{info, warn};
use waveq_core::{Error, Result};

/// Inputs that end the session, compared case-insensitively
pub const EXIT_TOKENS: [&str; 3] = ["sair", "exit", "quit"];

const PROMPT: &str = "\nSua pergunta sobre os dados/gráficos: ";
const REPROMPT: &str = "Por favor, digite uma pergunta válida.";

pub fn is_exit(input: &str) -> bool {
    let input = input.trim();
    EXIT_TOKENS.iter().any(|t| input.eq_ignore_ascii_case(t))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Agent,
}

/// One message of the conversation; never modified after it is appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            text: text.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Append-only conversation history
#[derive(Debug, Default)]
pub struct Session {
    turns: Vec<Turn>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// A completed exchange is always recorded as a pair
    fn record(&mut self, question: &str, answer: &str) {
        self.turns.push(Turn::user(question));
        self.turns.push(Turn::agent(answer));
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    ExitToken,
    EndOfInput,
}

/// Reads questions, asks the agent, prints answers.
pub struct SessionLoop<A> {
    agent: A,
    session: Session,
}

impl<A: ReasoningAgent> SessionLoop<A> {
    pub fn new(agent: A) -> Self {
        Self {
            agent,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// Run until an exit token or end of input. Only I/O failures on
    /// `output` end the loop with an error; agent failures are printed.
    pub async fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut output: W) -> Result<LoopExit> {
        let exit = loop {
            write!(output, "{}", PROMPT).map_err(Error::from)?;
            output.flush().map_err(Error::from)?;

            let mut line = String::new();
            let read = input.read_line(&mut line).map_err(Error::from)?;
            if read == 0 {
                writeln!(output).map_err(Error::from)?;
                break LoopExit::EndOfInput;
            }

            let question = line.trim();
            if is_exit(question) {
                break LoopExit::ExitToken;
            }
            if question.is_empty() {
                writeln!(output, "{}", REPROMPT).map_err(Error::from)?;
                continue;
            }

            match self.agent.answer(question, self.session.turns()).await {
                Ok(answer) => {
                    writeln!(output, "\n--- Resposta do Agente ---\n{}", answer).map_err(Error::from)?;
                    self.session.record(question, &answer);
                    info!(turns = self.session.len(), "turn completed");
                }
                Err(err) => {
                    warn!(error = %err, "turn failed");
                    writeln!(
                        output,
                        "\nOcorreu um erro ao processar a pergunta: {}\n\
                         Tente reformular a pergunta.",
                        err.message()
                    )
                    .map_err(Error::from)?;
                }
            }
        };

        writeln!(output, "Saindo...").map_err(Error::from)?;
        writeln!(output, "Programa finalizado.").map_err(Error::from)?;
        Ok(exit)
    }
}
