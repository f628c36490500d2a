//! Human-readable rendering of a proof (the `info` command)

use super::attestation::describe as describe_attestation;
use super::detached::DetachedTimestampFile;
use super::op::describe;
use super::timestamp::Timestamp;
use std::fmt::Write;

/// Render the file digest and the full commitment tree
pub fn render(file: &DetachedTimestampFile) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "File {} hash: {}",
        describe(&file.hash_op),
        hex::encode(file.digest())
    );
    let _ = writeln!(out, "Timestamp:");
    render_tree(&file.timestamp, 0, &mut out);
    out
}

fn render_tree(node: &Timestamp, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    for attestation in node.attestations() {
        let _ = writeln!(out, "{pad}verify {}", describe_attestation(attestation));
    }

    let ops: Vec<_> = node.ops().collect();
    if ops.len() > 1 {
        for (op, child) in ops {
            let _ = writeln!(out, "{pad} -> {}", describe(op));
            render_tree(child, indent + 4, out);
        }
    } else if let Some((op, child)) = ops.first() {
        let _ = writeln!(out, "{pad}{}", describe(op));
        render_tree(child, indent, out);
    }
}
