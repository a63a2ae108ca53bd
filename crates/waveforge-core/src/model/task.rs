use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One named, shell-executing step of a workflow.
///
/// Created by the parser and immutable thereafter. A task carrying a [`MatrixSpec`]
/// is a *template*: it is replaced by its expansions and never executed itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub run: String,

    #[serde(default)]
    pub shell: Option<String>,

    #[serde(rename = "workingDirectory", default)]
    pub working_directory: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(rename = "dependsOn", default)]
    pub depends_on: Vec<String>,

    #[serde(rename = "if", default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub input: Option<TaskInput>,

    #[serde(default)]
    pub output: Option<TaskOutputConfig>,

    #[serde(rename = "timeoutMs", default)]
    pub timeout_ms: Option<u64>,

    #[serde(rename = "continueOnError", default)]
    pub continue_on_error: bool,

    #[serde(rename = "retryCount", default)]
    pub retry_count: u32,

    #[serde(rename = "retryDelayMs", default)]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub matrix: Option<MatrixSpec>,

    #[serde(rename = "executionEnvironment", default)]
    pub execution_environment: Option<ExecutionEnvironmentOverride>,

    /// Set only on matrix-expanded instances; absent on the original template.
    #[serde(rename = "matrixValues", default)]
    pub matrix_values: Option<BTreeMap<String, String>>,
}

impl Task {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// True iff this task's `if` expression contains the literal predicate
    /// `always()`, case-insensitively. Such tasks are siphoned into the
    /// always-tasks wave by the scheduler rather than leveled normally.
    pub fn is_always_task(&self) -> bool {
        self.condition
            .as_deref()
            .map(|c| c.to_lowercase().contains("always()"))
            .unwrap_or(false)
    }
}

/// A per-task execution-environment override (Docker / SSH / Local). Mirrors
/// [`crate::model::ExecutionEnvironmentConfig`] but scoped to one task.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionEnvironmentOverride {
    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub docker: Option<DockerTarget>,

    #[serde(default)]
    pub ssh: Option<SshTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DockerTarget {
    pub container: String,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(rename = "workingDirectory", default)]
    pub working_directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(rename = "identityFile", default)]
    pub identity_file: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

/// A parameterized expansion spec attached to a task template.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MatrixSpec {
    /// Dimension name -> ordered list of string values, in the order declared in the
    /// workflow file. A plain `BTreeMap` would silently re-sort dimensions
    /// alphabetically, which would change which axis the Cartesian product iterates
    /// fastest and break the matrix fan-out/fan-in suffix convention, so this uses an
    /// order-preserving pair list instead (see [`ordered_map`]).
    #[serde(with = "ordered_map")]
    pub dimensions: Vec<(String, Vec<String>)>,

    #[serde(default)]
    pub include: Vec<BTreeMap<String, String>>,

    #[serde(default)]
    pub exclude: Vec<BTreeMap<String, String>>,
}

/// Serde helpers that deserialize a YAML/JSON mapping into an order-preserving
/// `Vec<(String, V)>` instead of a re-sorting map.
mod ordered_map {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;
    use std::marker::PhantomData;

    pub fn serialize<S, V>(value: &[(String, V)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        let mut map = serializer.serialize_map(Some(value.len()))?;
        for (k, v) in value {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = Vec<(String, V)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a mapping")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, V>()? {
                    out.push((k, v));
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

/// How a task's child process receives stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskInput {
    None,
    Text { value: String },
    Bytes { value: String },
    File { path: String },
    /// `expression` must resolve (via `tasks.<id>.output`) to a previously
    /// completed task's captured output.
    Pipe { expression: String },
}

impl Default for TaskInput {
    fn default() -> Self {
        TaskInput::None
    }
}

/// How output is captured for reporting/interpolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutputConfig {
    #[serde(default)]
    pub kind: TaskOutputKind,

    #[serde(rename = "captureStderr", default)]
    pub capture_stderr: bool,

    #[serde(rename = "maxSizeBytes", default = "default_max_size_bytes")]
    pub max_size_bytes: usize,

    /// Only meaningful when `kind == File`.
    #[serde(rename = "filePath", default)]
    pub file_path: Option<String>,
}

impl Default for TaskOutputConfig {
    fn default() -> Self {
        Self {
            kind: TaskOutputKind::default(),
            capture_stderr: false,
            max_size_bytes: default_max_size_bytes(),
            file_path: None,
        }
    }
}

fn default_max_size_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TaskOutputKind {
    #[default]
    String,
    Bytes,
    File,
    Stream,
}
