//! Prompts and tool definitions sent to the model

use serde_json::json;
use waveq_core::{DatasetSchema, ToolDefinition};

pub const LIST_TABLES: &str = "sql_db_list_tables";
pub const SCHEMA: &str = "sql_db_schema";
pub const QUERY: &str = "sql_db_query";
pub const PYTHON: &str = "python_repl";

/// Sensor and fault vocabulary for the vibration dataset
const DOMAIN_CONTEXT: &str = "\
Os dados são sinais de vibração de motores elétricos:
- 'Ch1 Y-Axis': vibração axial
- 'Ch2 Y-Axis': vibração vertical
- 'Ch3 Y-Axis': vibração horizontal
- Cada linha é uma amostra temporal; os sinais estão em aceleração [g].
- 'Condition', 'RPM' e 'Load_kW' descrevem o regime operacional.
Classes de falha em 'Condition': INNER_RACEWAY e OUTER_RACEWAY (rolamentos), \
STRUCTURAL_LOOSENESS (folga estrutural) e HEALTHY (vibração saudável).";

const REACT_FORMAT: &str = "\
Se não puder chamar as ferramentas diretamente, responda neste formato:
Thought: seu raciocínio sobre o próximo passo
Action: nome_da_ferramenta
Action Input: a entrada da ferramenta
Depois de receber a Observation, repita o ciclo ou termine com:
Final Answer: a resposta final para o usuário";

/// Build the system prompt for a session.
///
/// `artifact` is the chart file name when the Python tool is available.
pub fn system_prompt(schema: &DatasetSchema, backend: &str, artifact: Option<&str>) -> String {
    let tables = schema.table_names().join(", ");
    let mut tools = vec![LIST_TABLES, SCHEMA, QUERY];
    if artifact.is_some() {
        tools.push(PYTHON);
    }

    let mut prompt = format!(
        "Você é um agente especializado em analisar dados de vibração ({backend}).\n\
         Tabelas acessíveis: {tables}.\n\
         Ferramentas disponíveis: {tools}.\n\n\
         {DOMAIN_CONTEXT}\n\n\
         Ao responder:\n\
         - Para contar, filtrar ou resumir dados use '{QUERY}' com uma única consulta SELECT.\n\
         - Consulte '{SCHEMA}' antes de escrever SQL se não souber os nomes das colunas. \
         Colunas com espaços ou hífens devem ficar entre crases, por exemplo `Ch1 Y-Axis`.\n\
         - A tabela pode ter dezenas de milhões de linhas: use LIMIT para amostras \
         ou agregue os dados no SQL.\n",
        tools = tools.join(", "),
    );

    if let Some(artifact) = artifact {
        prompt.push_str(&format!(
            "- Se a pergunta pedir um GRÁFICO use '{PYTHON}'. Primeiro obtenha os dados com \
             '{QUERY}'; o resultado da última consulta fica disponível no Python como a \
             variável 'data' (lista de tuplas) e seus nomes de coluna em 'columns'. \
             Crie o DataFrame com `pd.DataFrame(data, columns=columns)`.\n\
             - Sempre salve o gráfico com plt.savefig(\"{artifact}\") e nunca use plt.show(). \
             Imprima uma confirmação depois de salvar.\n\
             - Se o Python falhar, informe o erro ao usuário.\n"
        ));
    }

    prompt.push_str("- Seja conciso e responda em português.\n\n");
    prompt.push_str(REACT_FORMAT);
    prompt
}

/// Native tool definitions for the OpenAI-style `tools` field
pub fn tool_definitions(with_python: bool) -> Vec<ToolDefinition> {
    let mut tools = vec![
        ToolDefinition::new(
            LIST_TABLES,
            "List the tables available for querying, comma separated.",
        ),
        ToolDefinition::new(
            SCHEMA,
            "Show the schema and sample rows of the given tables. \
             Input is a comma-separated list of table names.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "tables": { "type": "string", "description": "Comma-separated table names" }
            },
            "required": ["tables"]
        })),
        ToolDefinition::new(
            QUERY,
            "Run one read-only SQL query and return the rows. \
             The result is also bound as `data` for the next python_repl call.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "A single SELECT statement" }
            },
            "required": ["query"]
        })),
    ];

    if with_python {
        tools.push(
            ToolDefinition::new(
                PYTHON,
                "Run Python code. `data` holds the last query result as a list of tuples and \
                 `columns` its column names. Use pandas and matplotlib; print results.",
            )
            .with_parameters(json!({
                "type": "object",
                "properties": {
                    "code": { "type": "string", "description": "Python source to execute" }
                },
                "required": ["code"]
            })),
        );
    }

    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use waveq_core::{Column, TableSchema};

    fn schema() -> DatasetSchema {
        DatasetSchema::new(vec![TableSchema::new("waveforms", vec![Column::new("RPM", "double")])])
    }

    #[test]
    fn test_prompt_without_python() {
        let prompt = system_prompt(&schema(), "MySQL", None);
        assert!(prompt.contains("Tabelas acessíveis: waveforms"));
        assert!(prompt.contains("INNER_RACEWAY"));
        assert!(!prompt.contains(PYTHON));
        assert!(prompt.contains("Final Answer:"));
    }

    #[test]
    fn test_prompt_with_plotting_contract() {
        let prompt = system_prompt(&schema(), "MySQL", Some("grafico.png"));
        assert!(prompt.contains("plt.savefig(\"grafico.png\")"));
        assert!(prompt.contains("nunca use plt.show()"));
        assert!(prompt.contains(PYTHON));
    }

    #[test]
    fn test_tool_definitions() {
        assert_eq!(tool_definitions(false).len(), 3);
        let names: Vec<String> = tool_definitions(true).into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec![LIST_TABLES, SCHEMA, QUERY, PYTHON]);
    }
}
