//! GDF (GUESS) rendering, the format Gephi imports.

use std::path::Path;

use super::Graph;

const NODE_HEADER: &str =
    "nodedef>name VARCHAR,label VARCHAR,affiliation VARCHAR,affiliation_name VARCHAR";
const EDGE_HEADER: &str = "edgedef>node1 VARCHAR,node2 VARCHAR,label VARCHAR,directed BOOLEAN";

/// Quote values that would break the comma-separated row.
fn escape_value(value: &str) -> String {
    let flat: String = value
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if flat.contains([',', '"', '\'']) {
        format!("\"{}\"", flat.replace('"', "'"))
    } else {
        flat
    }
}

pub fn format_gdf(graph: &Graph) -> String {
    let mut output = String::new();
    output.push_str(NODE_HEADER);
    output.push('\n');
    for node in &graph.nodes {
        output.push_str(&format!(
            "{},{},{},{}\n",
            escape_value(&node.id),
            escape_value(&node.label),
            escape_value(&node.affiliation),
            escape_value(&node.affiliation_name),
        ));
    }

    output.push_str(EDGE_HEADER);
    output.push('\n');
    for edge in &graph.edges {
        output.push_str(&format!(
            "{},{},{},{}\n",
            escape_value(&edge.source),
            escape_value(&edge.target),
            escape_value(&edge.label),
            edge.directed,
        ));
    }
    output
}

pub async fn write_gdf(path: &Path, graph: &Graph) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, format_gdf(graph)).await
}
