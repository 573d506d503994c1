//! Plain-text listing of a history, one row per operation.

use unicode_width::UnicodeWidthStr;

use crate::history::{ChainRole, ObjectStore, OperationHistory};

fn chain_mark(role: ChainRole) -> &'static str {
    match role {
        ChainRole::NoChain => "",
        ChainRole::Start => "┌",
        ChainRole::Middle => "│",
        ChainRole::End => "└",
    }
}

fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(UnicodeWidthStr::width(text));
    format!("{}{}", text, " ".repeat(fill))
}

/// Render rows as `marker index kind type name chain`. The `>` marker sits on
/// the last done operation; undone operations are flagged at the end.
pub fn render<S: ObjectStore>(history: &OperationHistory<S>, store: &S) -> String {
    let rows: Vec<(String, String, String)> = (0..history.current_size())
        .map(|i| match history.get_operation_data(store, i) {
            Ok(data) => (
                data.kind.to_string(),
                data.object_type.to_string(),
                data.object_name,
            ),
            Err(_) => (
                history.operations()[i].kind().to_string(),
                "?".to_string(),
                "?".to_string(),
            ),
        })
        .collect();

    let type_width = rows.iter().map(|(_, t, _)| t.width()).max().unwrap_or(0);
    let name_width = rows.iter().map(|(_, _, n)| n.width()).max().unwrap_or(0);
    let index_width = history.current_size().saturating_sub(1).to_string().len();

    let mut output = String::new();
    for (i, (kind, object_type, name)) in rows.iter().enumerate() {
        let marker = if i + 1 == history.current_index() { '>' } else { ' ' };
        let mut tail = chain_mark(history.operations()[i].chain()).to_string();
        if i >= history.current_index() {
            if !tail.is_empty() {
                tail.push(' ');
            }
            tail.push_str("(undone)");
        }
        let line = format!(
            "{} {:>iw$}  {:<8}  {}  {}  {}",
            marker,
            i,
            kind,
            pad(object_type, type_width),
            pad(name, name_width),
            tail,
            iw = index_width,
        );
        output.push_str(line.trim_end());
        output.push('\n');
    }

    output.push_str(&format!(
        "{} operation(s), cursor {}, pool {} ({} held)\n",
        history.current_size(),
        history.current_index(),
        history.pool_len(),
        history.held_len(),
    ));
    output
}
