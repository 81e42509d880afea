//! DOT and node/link JSON views of a [`GraphOutput`], plus Graphviz rendering.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::GraphOutput;
use crate::error::{RelsubsError, Result};

/// Node/link document consumed by the force-directed web view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<DocumentNode>,
    pub links: Vec<DocumentLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub name: String,
    /// Display size, string-encoded for the front end.
    pub subs: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentLink {
    pub source: usize,
    pub target: usize,
    pub value: u32,
}

pub fn to_document(graph: &GraphOutput) -> GraphDocument {
    GraphDocument {
        nodes: graph
            .nodes()
            .iter()
            .map(|node| DocumentNode {
                name: node.name.clone(),
                subs: node.size.to_string(),
            })
            .collect(),
        links: graph
            .links()
            .iter()
            .map(|link| DocumentLink {
                source: link.source,
                target: link.target,
                value: link.value,
            })
            .collect(),
    }
}

/// Incremental `digraph` text builder.
pub struct DotWriter {
    buf: String,
}

impl DotWriter {
    pub fn new(name: &str) -> Self {
        Self {
            buf: format!("digraph {} {{\n", quote(name)),
        }
    }

    /// Append `"source" -> "target"` with optional `key=value` attributes.
    pub fn edge(&mut self, source: &str, target: &str, attrs: &[(&str, String)]) {
        let _ = write!(self.buf, "\t{} -> {}", quote(source), quote(target));
        if !attrs.is_empty() {
            let rendered: Vec<String> = attrs
                .iter()
                .map(|(key, value)| format!("{}={}", key, quote(value)))
                .collect();
            let _ = write!(self.buf, " [{}]", rendered.join(" "));
        }
        self.buf.push('\n');
    }

    pub fn finish(mut self) -> String {
        self.buf.push_str("}\n");
        self.buf
    }
}

fn quote(id: &str) -> String {
    format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn to_dot(graph: &GraphOutput) -> String {
    let mut writer = DotWriter::new("G");
    for (source, target) in graph.named_edges() {
        writer.edge(source, target, &[]);
    }
    writer.finish()
}

/// Render a DOT file with the Graphviz binary. The image is written next to
/// the source as `<dot_path>.<format>`.
pub fn render_image(dot_path: &Path, dot_binary: &str, format: &str) -> Result<PathBuf> {
    let image_path = PathBuf::from(format!("{}.{}", dot_path.display(), format));

    let output = Command::new(dot_binary)
        .arg(format!("-T{}", format))
        .arg(dot_path)
        .arg("-o")
        .arg(&image_path)
        .output()
        .map_err(|e| RelsubsError::Render(format!("failed to run {}: {}", dot_binary, e)))?;

    if !output.status.success() {
        return Err(RelsubsError::Render(format!(
            "{} exited with {}: {}",
            dot_binary,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(image_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> GraphOutput {
        let mut graph = GraphOutput::new(10);
        let python = graph.register("python", 500_000);
        let learn = graph.register("learnpython", 0);
        let django = graph.register("django", 100);
        graph.add_edge(python, learn, 2);
        graph.add_edge(python, django, 1);
        graph
    }

    #[test]
    fn test_document_shape() {
        let doc = to_document(&sample_graph());
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["nodes"][0]["name"], "python");
        assert_eq!(json["nodes"][0]["subs"], "36");
        assert_eq!(json["nodes"][1]["subs"], "10");
        assert_eq!(json["links"][1]["source"], 0);
        assert_eq!(json["links"][1]["target"], 2);
        assert_eq!(json["links"][1]["value"], 1);
    }

    #[test]
    fn test_dot_output() {
        let dot = to_dot(&sample_graph());
        assert!(dot.starts_with("digraph \"G\" {\n"));
        assert!(dot.contains("\t\"python\" -> \"learnpython\"\n"));
        assert!(dot.contains("\t\"python\" -> \"django\"\n"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_dot_writer_attributes_and_escaping() {
        let mut writer = DotWriter::new("full");
        writer.edge("a\"b", "c", &[("weight", "3.5".to_string())]);
        let dot = writer.finish();
        assert!(dot.contains("\"a\\\"b\" -> \"c\" [weight=\"3.5\"]"));
    }

    #[test]
    fn test_render_with_missing_binary_fails() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dot_path = temp_dir.path().join("g.gv");
        std::fs::write(&dot_path, to_dot(&sample_graph())).unwrap();
        let err = render_image(&dot_path, "definitely-not-graphviz-binary", "png").unwrap_err();
        assert!(matches!(err, RelsubsError::Render(_)));
    }
}
