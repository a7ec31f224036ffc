//! # waveq CLI
//!
//! Ask natural-language questions about vibration data.
//!
//! Usage:
//!   waveq                     interactive session over the MySQL table
//!   waveq db --no-plot        same, without the Python tool
//!   waveq csv <file.csv>      interactive session over a CSV file
//!   waveq extract <file.pdf>  save the text of a PDF
//!   waveq ping                check the database connection
//!
//! Examples:
//!   waveq -v
//!   waveq csv waveforms_inner_raceway.csv --drop Load_kW
//!   waveq extract manual.pdf -o manual.txt

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use waveq_agent::{Agent, AgentConfig, LoopExit, SessionLoop};
use waveq_core::config::{self, describe_environment, DATABASE_VARS, GROQ_API_KEY};
use waveq_core::error::from_provider;
use waveq_core::{
    extract_pdf_text, save_text, Config, CsvOptions, CsvSource, DataSource, DatabaseConfig, Error,
    MySqlSource, OpenAIProvider, PythonSandbox, Result, DEFAULT_TEXT_OUTPUT,
};

#[derive(Parser)]
#[command(name = "waveq")]
#[command(author, version, about = "waveq - ask questions about vibration data")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Show the agent's steps and info-level logs
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session over the MySQL table (default)
    Db {
        /// Disable the Python tool (SQL answers only)
        #[arg(long)]
        no_plot: bool,
    },
    /// Interactive session over a CSV file
    Csv {
        /// Path to the CSV file
        path: PathBuf,

        /// Numbers use a decimal comma (0,013)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        decimal_comma: bool,

        /// Columns to drop before loading
        #[arg(long = "drop", num_args = 1.., default_values_t = vec!["Load_kW".to_string()])]
        drop_columns: Vec<String>,

        /// Disable the Python tool
        #[arg(long)]
        no_plot: bool,
    },
    /// Extract the text of a PDF to a file
    Extract {
        /// Path to the PDF
        pdf: PathBuf,

        /// Output file
        #[arg(short, long, default_value = DEFAULT_TEXT_OUTPUT)]
        output: PathBuf,
    },
    /// Connect to MySQL and run SELECT 1
    Ping,
}

const EXAMPLES: [&str; 3] = [
    "Mostre as primeiras 5 linhas da tabela.",
    "Qual a média de RPM?",
    "Plote X-Axis vs Ch1 Y-Axis para as primeiras 100 linhas",
];

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,waveq_core=info,waveq_agent=info,waveq=info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Print the failure with the masked variable report and exit
fn exit_config_error(err: &Error, names: &[&str]) -> ! {
    eprintln!("Erro: {}", err.message());
    eprintln!("Verifique se as variáveis estão definidas no seu arquivo .env");
    eprintln!("Variáveis obtidas:");
    for line in describe_environment(names, |k| std::env::var(k).ok()) {
        eprintln!("  {}", line);
    }
    std::process::exit(1);
}

fn exit_error(context: &str, err: &Error) -> ! {
    eprintln!("{}: {}", context, err.message());
    tracing::debug!(error = %err, "fatal");
    std::process::exit(1);
}

fn load_config(with_database: bool) -> Config {
    match Config::from_env(with_database) {
        Ok(config) => config,
        Err(err) => {
            let mut names: Vec<&str> = if with_database { DATABASE_VARS.to_vec() } else { Vec::new() };
            names.push(GROQ_API_KEY);
            exit_config_error(&err, &names)
        }
    }
}

/// Wire provider, source and sandbox into an agent and run the question loop
async fn run_session<D: DataSource>(
    source: D,
    config: &Config,
    plot: bool,
    verbose: bool,
) -> Result<LoopExit> {
    let provider = OpenAIProvider::new(config.llm.provider_config()).map_err(from_provider)?;
    let sandbox = if plot {
        Some(PythonSandbox::new(&config.sandbox, std::env::current_dir()?))
    } else {
        None
    };

    let agent_config = AgentConfig::from_settings(&config.agent, &config.llm).with_verbose(verbose);
    let mut session = SessionLoop::new(Agent::new(provider, source, sandbox, agent_config));

    let stdin = std::io::stdin();
    let exit = session.run(stdin.lock(), std::io::stdout()).await?;

    if verbose {
        let usage = session.agent().usage();
        println!(
            "({} turns, {} LLM calls, {} tokens)",
            session.session().len(),
            usage.total_calls,
            usage.total_tokens()
        );
    }
    Ok(exit)
}

fn print_examples(plot: bool) {
    let examples: Vec<&str> = if plot {
        EXAMPLES.to_vec()
    } else {
        EXAMPLES[..2].to_vec()
    };
    let quoted: Vec<String> = examples.iter().map(|e| format!("'{}'", e)).collect();
    println!("Exemplos: {}", quoted.join(", "));
    println!("Digite 'sair' a qualquer momento para encerrar.");
}

async fn run_db(plot: bool, verbose: bool) {
    let config = load_config(true);
    let Some(db) = config.database.clone() else {
        exit_config_error(&Error::config_missing(&DATABASE_VARS), &DATABASE_VARS)
    };

    let source = match MySqlSource::connect(&db, config.agent.row_limit).await {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Erro ao conectar ao banco de dados: {}", err.message());
            eprintln!("Destino: {}@{}:{}/{}", db.user, db.host, db.port, db.database);
            eprintln!("Verifique as credenciais no .env e se o servidor MySQL está acessível.");
            std::process::exit(1);
        }
    };

    println!("Conexão com o banco de dados '{}' estabelecida com sucesso.", source.database());
    println!("Tabelas acessíveis para o agente: {}", db.tables.join(", "));
    if plot {
        println!("Agente SQL + Plotting pronto!");
        println!("Peça gráficos de AMOSTRAS ou DADOS AGREGADOS devido ao volume.");
    } else {
        println!("Agente SQL pronto!");
    }
    print_examples(plot);

    if let Err(err) = run_session(source, &config, plot, verbose).await {
        exit_error("Erro na sessão", &err);
    }
}

async fn run_csv(path: PathBuf, options: CsvOptions, plot: bool, verbose: bool) {
    let config = load_config(false);
    println!("Chave carregada com sucesso.");

    let source = match CsvSource::load(&path, &options, config.agent.row_limit) {
        Ok(source) => source,
        Err(err) => exit_error("Erro ao carregar CSV", &err),
    };

    if let Some(table) = source.schema().tables().first() {
        println!(
            "CSV carregado: {} linhas, {} colunas (tabela '{}')",
            table.row_count.unwrap_or(0),
            table.columns.len(),
            table.name
        );
    }
    println!("Agente pronto! Baseado no arquivo: {}", path.display());
    print_examples(plot);

    if let Err(err) = run_session(source, &config, plot, verbose).await {
        exit_error("Erro na sessão", &err);
    }
}

fn run_extract(pdf: PathBuf, output: PathBuf) {
    let text = match extract_pdf_text(&pdf) {
        Ok(text) => text,
        Err(err) => exit_error("Erro ao extrair o texto do PDF", &err),
    };
    if let Err(err) = save_text(&output, &text) {
        exit_error("Erro ao salvar o texto", &err);
    }
    println!("Texto extraído e salvo em: {}", output.display());
}

async fn run_ping() {
    let db = match DatabaseConfig::from_lookup(|k| std::env::var(k).ok()) {
        Ok(db) => db,
        Err(err) => exit_config_error(&err, &DATABASE_VARS),
    };

    let source = match MySqlSource::connect(&db, 1).await {
        Ok(source) => source,
        Err(err) => exit_error("Erro ao conectar", &err),
    };
    match source.ping().await {
        Ok(result) => println!("Conexão bem-sucedida! Resultado: {}", result.render()),
        Err(err) => exit_error("Erro ao executar SELECT 1", &err),
    }
    source.close().await;
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    config::load_dotenv();

    match cli.command.unwrap_or(Commands::Db { no_plot: false }) {
        Commands::Db { no_plot } => run_db(!no_plot, cli.verbose).await,
        Commands::Csv {
            path,
            decimal_comma,
            drop_columns,
            no_plot,
        } => {
            let options = CsvOptions::default()
                .with_decimal_comma(decimal_comma)
                .with_drop_columns(drop_columns);
            run_csv(path, options, !no_plot, cli.verbose).await
        }
        Commands::Extract { pdf, output } => run_extract(pdf, output),
        Commands::Ping => run_ping().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_is_db_session() {
        let cli = Cli::try_parse_from(["waveq"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_csv_defaults_match_vibration_export() {
        let cli = Cli::try_parse_from(["waveq", "csv", "waves.csv"]).unwrap();
        match cli.command {
            Some(Commands::Csv {
                decimal_comma,
                drop_columns,
                no_plot,
                ..
            }) => {
                assert!(decimal_comma);
                assert_eq!(drop_columns, vec!["Load_kW"]);
                assert!(!no_plot);
            }
            _ => panic!("expected csv command"),
        }

        let cli = Cli::try_parse_from([
            "waveq", "-v", "csv", "waves.csv", "--decimal-comma", "false", "--drop", "RPM", "Condition",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Csv {
                decimal_comma,
                drop_columns,
                ..
            }) => {
                assert!(!decimal_comma);
                assert_eq!(drop_columns, vec!["RPM", "Condition"]);
            }
            _ => panic!("expected csv command"),
        }
    }

    #[test]
    fn test_extract_default_output() {
        let cli = Cli::try_parse_from(["waveq", "extract", "manual.pdf"]).unwrap();
        match cli.command {
            Some(Commands::Extract { output, .. }) => {
                assert_eq!(output, PathBuf::from("texto_extraido_do_pdf.txt"))
            }
            _ => panic!("expected extract command"),
        }
    }
}
