pub mod ast;
pub mod config;
pub mod editor;
pub mod history;
pub mod lexer;
pub mod listing;
pub mod model;
pub mod parser;
pub mod script;
pub mod serializer;

use wasm_bindgen::prelude::*;

use config::HistoryConfig;

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Replay an edit script over ERD source and return the resulting ERD source.
#[wasm_bindgen(js_name = "replayEdits")]
pub fn replay_edits(source: &str, script: &str, max_history: Option<u32>) -> Result<String, String> {
    let config = match max_history {
        Some(max) => HistoryConfig::new(max as usize).map_err(|e| e.to_string())?,
        None => HistoryConfig::default(),
    };
    let editor = script::replay(source, script, config).map_err(|e| e.to_string())?;
    Ok(editor.source())
}
