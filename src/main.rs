use erd_history::config::HistoryConfig;
use erd_history::listing;
use erd_history::script;
use std::env;
use std::fs;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <input.erd> [options]", args[0]);
        eprintln!();
        eprintln!("Options:");
        eprintln!("  -s, --script <file>       Edit script to replay (default: none)");
        eprintln!("  -o, --output <file>       Output file (default: stdout)");
        eprintln!("  -m, --max-history <n>     History capacity (default: 500)");
        eprintln!("      --history             Print the history listing to stderr");
        process::exit(1);
    }

    let input_path = &args[1];
    let mut script_path: Option<String> = None;
    let mut output_path: Option<String> = None;
    let mut config = HistoryConfig::default();
    let mut show_history = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "-s" | "--script" => {
                i += 1;
                if i < args.len() {
                    script_path = Some(args[i].clone());
                }
            }
            "-o" | "--output" => {
                i += 1;
                if i < args.len() {
                    output_path = Some(args[i].clone());
                }
            }
            "-m" | "--max-history" => {
                i += 1;
                if i < args.len() {
                    config = HistoryConfig::from_str(&args[i]).unwrap_or_else(|| {
                        eprintln!("Invalid history capacity: {}", args[i]);
                        process::exit(1);
                    });
                }
            }
            "--history" => show_history = true,
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let input = read(input_path);
    let edits = script_path.as_deref().map(read).unwrap_or_default();

    let editor = match script::replay(&input, &edits, config) {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if show_history {
        eprint!("{}", listing::render(editor.history(), editor.model()));
    }

    let erd = editor.source();
    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(&path, &erd) {
                eprintln!("Failed to write {}: {}", path, e);
                process::exit(1);
            }
        }
        None => print!("{}", erd),
    }
}

fn read(path: &str) -> String {
    match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read {}: {}", path, e);
            process::exit(1);
        }
    }
}
