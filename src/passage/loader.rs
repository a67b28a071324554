//! Loading passage rows from JSON, JSONL and Parquet files.
//!
//! Rows are normalised to `serde_json::Value` first (Parquet batches go
//! through arrow's JSON writer), then turned into passage text by a
//! [`RowFormat`].

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{hub, CyclicPassages};
use crate::error::PassageError;

/// How one dataset row becomes a passage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFormat {
    /// `conversations: [{from: "human" | "gpt", value}]`, rendered as
    /// `Human:` / `Assistant:` turns separated by blank lines.
    Conversation,
    /// `instruction` + `output`, rendered as `Request: ...\n\nCode: ...`.
    Instruction,
    /// A single string column.
    #[default]
    Text,
}

/// Where the rows of a passage source live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLocation {
    /// A local `.json`, `.jsonl` or `.parquet` file.
    Path(PathBuf),
    /// A file in a HuggingFace dataset repository, downloaded once and cached.
    Hub {
        repo: String,
        file: String,
        #[serde(default = "default_revision")]
        revision: String,
    },
}

fn default_revision() -> String {
    "main".to_string()
}

/// Configuration of one passage source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassageSourceConfig {
    /// Dataset name templates refer to.
    pub dataset: String,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub source: SourceLocation,
    #[serde(default)]
    pub format: RowFormat,
    /// Column read by [`RowFormat::Text`].
    #[serde(default = "default_text_field")]
    pub text_field: String,
}

fn default_text_field() -> String {
    "text".to_string()
}

impl PassageSourceConfig {
    pub fn hub(
        dataset: impl Into<String>,
        repo: impl Into<String>,
        revision: impl Into<String>,
        file: impl Into<String>,
        format: RowFormat,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            source: SourceLocation::Hub {
                repo: repo.into(),
                file: file.into(),
                revision: revision.into(),
            },
            format,
            text_field: default_text_field(),
        }
    }

    pub fn local(dataset: impl Into<String>, path: impl Into<PathBuf>, format: RowFormat) -> Self {
        Self {
            dataset: dataset.into(),
            source: SourceLocation::Path(path.into()),
            format,
            text_field: default_text_field(),
        }
    }
}

/// Turn a row into passage text. `None` means the row does not fit the format.
pub fn format_row(row: &Value, format: RowFormat, text_field: &str) -> Option<String> {
    let passage = match format {
        RowFormat::Conversation => {
            let turns = row.get("conversations")?.as_array()?;
            let mut rendered = Vec::with_capacity(turns.len());
            for turn in turns {
                let prefix = match turn.get("from")?.as_str()? {
                    "human" => "Human: ",
                    "gpt" => "Assistant: ",
                    _ => return None,
                };
                rendered.push(format!("{}{}", prefix, turn.get("value")?.as_str()?));
            }
            rendered.join("\n\n").trim().to_string()
        }
        RowFormat::Instruction => {
            let instruction = row.get("instruction")?.as_str()?.trim();
            let output = row.get("output")?.as_str()?.trim();
            format!("Request: {}\n\nCode: {}", instruction, output)
        }
        RowFormat::Text => row.get(text_field)?.as_str()?.trim().to_string(),
    };

    if passage.is_empty() {
        None
    } else {
        Some(passage)
    }
}

/// Read raw rows from a local file, picking the parser by extension.
pub fn read_rows(path: &Path) -> Result<Vec<Value>, PassageError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "json" => read_json_array(path),
        "jsonl" | "ndjson" => read_json_lines(path),
        "parquet" => read_parquet_rows(path),
        _ => Err(PassageError::UnsupportedFile(path.display().to_string())),
    }
}

fn read_json_array(path: &Path) -> Result<Vec<Value>, PassageError> {
    let content = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Array(rows) => Ok(rows),
        _ => Err(PassageError::Malformed {
            path: path.display().to_string(),
            message: "expected a top-level JSON array".to_string(),
        }),
    }
}

fn read_json_lines(path: &Path) -> Result<Vec<Value>, PassageError> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut rows = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|e| PassageError::Malformed {
            path: path.display().to_string(),
            message: format!("line {}: {}", number + 1, e),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

fn read_parquet_rows(path: &Path) -> Result<Vec<Value>, PassageError> {
    use arrow::json::ArrayWriter;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let file = fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result?;
        let mut writer = ArrayWriter::new(Vec::new());
        writer.write(&batch)?;
        writer.finish()?;
        let buf = writer.into_inner();
        if buf.is_empty() {
            continue;
        }
        if let Value::Array(batch_rows) = serde_json::from_slice(&buf)? {
            rows.extend(batch_rows);
        }
    }
    Ok(rows)
}

/// Resolve the source to a local file, downloading it if needed.
async fn resolve_location(
    config: &PassageSourceConfig,
    cache_dir: &Path,
    hf_token: Option<&str>,
) -> Result<PathBuf, PassageError> {
    match &config.source {
        SourceLocation::Path(path) => Ok(path.clone()),
        SourceLocation::Hub {
            repo,
            file,
            revision,
        } => hub::download_file(repo, revision, file, cache_dir, hf_token).await,
    }
}

/// Load, format and shuffle one passage source.
pub async fn load_source<R: Rng + ?Sized>(
    config: &PassageSourceConfig,
    cache_dir: &Path,
    hf_token: Option<&str>,
    rng: &mut R,
) -> Result<CyclicPassages, PassageError> {
    let path = resolve_location(config, cache_dir, hf_token).await?;
    let rows = read_rows(&path)?;
    let total = rows.len();

    let passages: Vec<String> = rows
        .iter()
        .filter_map(|row| format_row(row, config.format, &config.text_field))
        .collect();

    let skipped = total - passages.len();
    if skipped > 0 {
        tracing::debug!(
            dataset = %config.dataset,
            skipped,
            "Skipped rows that do not match the passage format"
        );
    }
    tracing::info!(
        dataset = %config.dataset,
        path = %path.display(),
        passages = passages.len(),
        format = ?config.format,
        "Loaded passage source"
    );

    CyclicPassages::shuffled(&config.dataset, passages, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passage::PassageSource;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_conversation_format() {
        let row = json!({
            "conversations": [
                {"from": "human", "value": "What is a monad?"},
                {"from": "gpt", "value": "A monoid in the category of endofunctors.  "}
            ]
        });
        assert_eq!(
            format_row(&row, RowFormat::Conversation, "text").unwrap(),
            "Human: What is a monad?\n\nAssistant: A monoid in the category of endofunctors."
        );
    }

    #[test]
    fn test_conversation_with_unknown_role_is_skipped() {
        let row = json!({"conversations": [{"from": "system", "value": "x"}]});
        assert!(format_row(&row, RowFormat::Conversation, "text").is_none());
    }

    #[test]
    fn test_instruction_format() {
        let row = json!({"instruction": "  Reverse a list ", "output": "xs[::-1]\n"});
        assert_eq!(
            format_row(&row, RowFormat::Instruction, "text").unwrap(),
            "Request: Reverse a list\n\nCode: xs[::-1]"
        );
        assert!(format_row(&json!({"instruction": "x"}), RowFormat::Instruction, "text").is_none());
    }

    #[test]
    fn test_text_format_uses_configured_field() {
        let row = json!({"body": " hello ", "text": ""});
        assert_eq!(format_row(&row, RowFormat::Text, "body").unwrap(), "hello");
        assert!(format_row(&row, RowFormat::Text, "text").is_none());
    }

    #[test]
    fn test_read_jsonl_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        fs::write(&path, "{\"text\":\"a\"}\n\n{\"text\":\"b\"}\n").unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["text"], "b");
    }

    #[test]
    fn test_read_jsonl_reports_bad_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        fs::write(&path, "{\"text\":\"a\"}\nnot json\n").unwrap();

        match read_rows(&path) {
            Err(PassageError::Malformed { message, .. }) => assert!(message.starts_with("line 2")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_read_json_array_requires_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.json");
        fs::write(&path, "{\"text\":\"a\"}").unwrap();
        assert!(matches!(
            read_rows(&path),
            Err(PassageError::Malformed { .. })
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            read_rows(Path::new("passages.csv")),
            Err(PassageError::UnsupportedFile(_))
        ));
    }

    #[test]
    fn test_read_parquet_rows() {
        use arrow::array::{ArrayRef, StringArray};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("code.parquet");

        let instruction: ArrayRef = Arc::new(StringArray::from(vec!["Add", "Sub"]));
        let output: ArrayRef = Arc::new(StringArray::from(vec!["a + b", "a - b"]));
        let batch =
            RecordBatch::try_from_iter(vec![("instruction", instruction), ("output", output)])
                .unwrap();

        let file = fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            format_row(&rows[1], RowFormat::Instruction, "text").unwrap(),
            "Request: Sub\n\nCode: a - b"
        );
    }

    #[tokio::test]
    async fn test_load_source_from_local_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("text.json");
        fs::write(
            &path,
            r#"[{"text": "one"}, {"text": "   "}, {"other": 1}, {"text": "two"}]"#,
        )
        .unwrap();

        let config = PassageSourceConfig::local("text", &path, RowFormat::Text);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut source = load_source(&config, dir.path(), None, &mut rng)
            .await
            .unwrap();

        assert_eq!(source.len(), 2);
        let mut drawn = vec![source.next_passage(), source.next_passage()];
        drawn.sort();
        assert_eq!(drawn, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_config_yaml_shape() {
        let yaml = r#"
- dataset: text
  format: conversation
  source:
    hub:
      repo: WizardLM/WizardLM_evol_instruct_V2_196k
      file: WizardLM_evol_instruct_V2_143k.json
- dataset: code
  source:
    path: ./data/code.jsonl
"#;
        let configs: Vec<PassageSourceConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(configs[0].format, RowFormat::Conversation);
        match &configs[0].source {
            SourceLocation::Hub { revision, .. } => assert_eq!(revision, "main"),
            other => panic!("unexpected source: {:?}", other),
        }
        assert_eq!(configs[1].format, RowFormat::Text);
        assert_eq!(configs[1].text_field, "text");
        assert_eq!(
            configs[1].source,
            SourceLocation::Path(PathBuf::from("./data/code.jsonl"))
        );
    }
}
