//! Object naming: turns an artifact name into an object key.
//!
//! A format string such as `rank_{rank}/{artifact_name}` is parsed once, then
//! rendered against a [`RunContext`] for every submitted artifact. Leading `/`
//! characters of the rendered key are stripped.

use crate::error::{FerryError, Result};

pub const DEFAULT_OBJECT_NAME_FORMAT: &str = "{run_name}/{artifact_name}";

/// Object key used when validating credentials at start-up.
pub const CREDENTIALS_MARKER_ARTIFACT: &str = ".credentials_validated_successfully";

/// Metadata of the run producing the artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_name: String,
    pub rank: usize,
    pub local_rank: usize,
    pub world_size: usize,
    pub local_world_size: usize,
    pub node_rank: usize,
}

impl RunContext {
    /// Single-process run.
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            rank: 0,
            local_rank: 0,
            world_size: 1,
            local_world_size: 1,
            node_rank: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable {
    ArtifactName,
    RunName,
    Rank,
    LocalRank,
    WorldSize,
    LocalWorldSize,
    NodeRank,
}

impl Variable {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "artifact_name" => Variable::ArtifactName,
            "run_name" => Variable::RunName,
            "rank" => Variable::Rank,
            "local_rank" => Variable::LocalRank,
            "world_size" => Variable::WorldSize,
            "local_world_size" => Variable::LocalWorldSize,
            "node_rank" => Variable::NodeRank,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(Variable),
}

/// Parsed object name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNameFormat {
    source: String,
    segments: Vec<Segment>,
}

impl ObjectNameFormat {
    /// Parse a template. `{{` and `}}` produce literal braces.
    pub fn parse(format: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = format.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => name.push(ch),
                            None => {
                                return Err(FerryError::ObjectName(format!(
                                    "unclosed '{{' in {format:?}"
                                )));
                            }
                        }
                    }
                    let var = Variable::parse(name.trim()).ok_or_else(|| {
                        FerryError::ObjectName(format!("unknown variable {{{name}}} in {format:?}"))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Var(var));
                }
                '}' => {
                    return Err(FerryError::ObjectName(format!(
                        "unmatched '}}' in {format:?}"
                    )));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: format.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render the object key for `artifact_name`.
    pub fn render(&self, run: &RunContext, artifact_name: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Var(Variable::ArtifactName) => out.push_str(artifact_name),
                Segment::Var(Variable::RunName) => out.push_str(&run.run_name),
                Segment::Var(Variable::Rank) => out.push_str(&run.rank.to_string()),
                Segment::Var(Variable::LocalRank) => out.push_str(&run.local_rank.to_string()),
                Segment::Var(Variable::WorldSize) => out.push_str(&run.world_size.to_string()),
                Segment::Var(Variable::LocalWorldSize) => {
                    out.push_str(&run.local_world_size.to_string())
                }
                Segment::Var(Variable::NodeRank) => out.push_str(&run.node_rank.to_string()),
            }
        }
        out.trim_start_matches('/').to_string()
    }
}
