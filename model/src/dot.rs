use std::collections::HashSet;
use std::fmt::Write;

use crate::document::Document;
use crate::element::Element;

/// Render the whole document as a Graphviz digraph.
pub fn dot(doc: &Document, depth: i32) -> String {
    let mut body = String::new();
    let mut visited = HashSet::new();
    for root in doc.roots() {
        to_dot(doc, root, depth, &mut visited, &mut body);
    }
    format!("digraph sbom {{\n{body}}}\n")
}

/// Render the subgraph hanging off a single element.
pub fn dot_subgraph(doc: &Document, start: &str, depth: i32) -> String {
    let mut body = String::new();
    let mut visited = HashSet::new();
    to_dot(doc, start, depth, &mut visited, &mut body);
    format!("digraph sbom {{\n{body}}}\n")
}

/// Emit the node declaration for `id` and one edge per relationship,
/// recursing into peers. The visited set prevents infinite recursion on
/// cycles but does not filter edges.
fn to_dot(doc: &Document, id: &str, depth: i32, visited: &mut HashSet<String>, out: &mut String) {
    if depth == 0 {
        return;
    }
    if !visited.insert(id.to_string()) {
        return;
    }
    let Some(element) = doc.get(id) else {
        return;
    };

    let _ = writeln!(
        out,
        "\"{id}\" [label=\"{}\" tooltip=\"{}\" fontname=\"monospace\"];",
        element.name,
        tooltip(element)
    );

    for rel in &element.relationships {
        let Some(peer) = &rel.peer else { continue };
        let _ = writeln!(out, "\"{id}\" -> \"{peer}\";");
        to_dot(doc, peer, depth.saturating_sub(1), visited, out);
    }
}

/// Key-value summary of an element, skipping empty fields. Newlines are
/// emitted as literal `\n` escapes for the DOT attribute value.
fn tooltip(element: &Element) -> String {
    let mut fields: Vec<(&str, String)> = vec![
        ("ID", element.id().to_string()),
        ("Name", element.name.clone()),
    ];
    match element.as_package() {
        Some(data) => {
            fields.push(("Version", data.version.clone()));
            fields.push(("FilesAnalyzed", data.files_analyzed.to_string()));
        }
        None => {
            if let Some(file) = element.as_file() {
                fields.push(("FileName", file.file_name.clone()));
            }
        }
    }

    let mut out = String::new();
    for (key, value) in fields {
        if value.is_empty() {
            continue;
        }
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&value);
        out.push_str("\\n");
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::element::Element;
    use crate::relationship::RelationshipType;

    /// The diamond graph: root -> node-1/node-2 -> leaf.
    fn diamond() -> Document {
        let mut doc = Document::new();
        let mk = |id: &str| {
            let mut p = Element::package(id);
            p.set_id(id);
            p
        };
        doc.add_package(mk("root")).unwrap();
        doc.attach("root", RelationshipType::Contains, mk("node-1")).unwrap();
        doc.attach("root", RelationshipType::Contains, mk("node-2")).unwrap();
        doc.attach("node-1", RelationshipType::Contains, mk("leaf")).unwrap();
        doc.relate(
            "node-2",
            crate::relationship::Relationship::to_peer(RelationshipType::Contains, "leaf"),
        )
        .unwrap();
        doc
    }

    #[test]
    fn diamond_nodes_and_edges() {
        let out = dot(&diamond(), -1);

        let mut expected: Vec<&str> = vec![
            "\"root\" [label=\"root\" tooltip=\"ID: root\\nName: root\\nFilesAnalyzed: false\\n\" fontname=\"monospace\"];",
            "\"root\" -> \"node-1\";",
            "\"node-1\" [label=\"node-1\" tooltip=\"ID: node-1\\nName: node-1\\nFilesAnalyzed: false\\n\" fontname=\"monospace\"];",
            "\"node-1\" -> \"leaf\";",
            "\"leaf\" [label=\"leaf\" tooltip=\"ID: leaf\\nName: leaf\\nFilesAnalyzed: false\\n\" fontname=\"monospace\"];",
            "\"root\" -> \"node-2\";",
            "\"node-2\" [label=\"node-2\" tooltip=\"ID: node-2\\nName: node-2\\nFilesAnalyzed: false\\n\" fontname=\"monospace\"];",
            "\"node-2\" -> \"leaf\";",
        ];

        let mut lines: Vec<&str> = out
            .lines()
            .filter(|l| !l.starts_with("digraph") && *l != "}")
            .collect();
        expected.sort_unstable();
        lines.sort_unstable();
        assert_eq!(expected, lines);
    }

    #[test]
    fn node_declared_once_edges_kept() {
        let out = dot(&diamond(), -1);
        // one declaration, two incoming edges
        assert_eq!(1, out.matches("\"leaf\" [label=").count());
        assert_eq!(2, out.matches("-> \"leaf\";").count());
    }

    #[test]
    fn subgraph_starts_at_node() {
        let out = dot_subgraph(&diamond(), "node-1", -1);
        assert!(out.contains("\"node-1\" [label="));
        assert!(out.contains("\"leaf\" [label="));
        assert!(!out.contains("\"root\""));
    }
}
