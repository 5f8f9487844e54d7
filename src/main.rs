//! Developer CLI driving the project engine against the configured store.

use std::path::{Path, PathBuf};

use scribble::config::{self, Settings, StorageBackend};
use scribble::{Engine, ProjectSummary, logging};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    let settings = load_settings(&options)?;
    if let Err(err) = logging::init(&settings.logging) {
        eprintln!("Logging disabled: {err}");
    }
    let engine = Engine::from_settings(&settings).map_err(|err| err.to_string())?;
    execute(&engine, options.command).map_err(|err| err.to_string())
}

fn load_settings(options: &Options) -> Result<Settings, String> {
    let mut settings = match &options.config_path {
        Some(path) => config::load_from(path),
        None => config::load_or_default(),
    }
    .map_err(|err| err.to_string())?;
    if let Some(backend) = options.backend {
        settings.storage.backend = backend;
    }
    if let Some(root) = &options.root {
        settings.storage.root = Some(root.clone());
    }
    if let Some(db) = &options.db_path {
        settings.storage.document_path = Some(db.clone());
    }
    Ok(settings)
}

fn execute(engine: &Engine, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Init {
            name,
            labels,
            persistent,
        } => print_summary(&engine.init_project(&name, labels, persistent)?),
        Command::Save { name, class, image } => {
            let bytes = read_file(&image)?;
            let sequence = engine.save_sample(&name, class, &bytes)?;
            println!("Stored sample {sequence} in class {class}.");
        }
        Command::Train { name } => {
            let outcome = engine.train(&name)?;
            println!(
                "Trained {} on {} sample(s) ({} skipped).",
                outcome.variant, outcome.samples, outcome.skipped
            );
        }
        Command::Predict { name, image } => {
            let bytes = read_file(&image)?;
            println!("{}", engine.predict(&name, &bytes)?);
        }
        Command::Rotate { name } => println!("{}", engine.rotate_variant(&name)?),
        Command::SaveAll { name } => print_summary(&engine.save_project_permanently(&name)?),
        Command::Discard { name } => {
            let removed = engine.discard_project(&name)?;
            println!("Discarded '{name}' ({removed} sample(s) removed).");
        }
        Command::Load { name, labels } => print_summary(&engine.load_project(&name, labels)?),
        Command::Export { name, path } => {
            let variant = engine.export_active_model(&name, &path)?;
            println!("Exported {variant} to {}.", path.display());
        }
        Command::Import { name, path } => {
            let variant = engine.import_model(&name, &path)?;
            println!("Imported {variant}; it is now the active model.");
        }
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|err| format!("Could not read {}: {err}", path.display()))
}

fn print_summary(summary: &ProjectSummary) {
    let [a, b, c] = &summary.class_labels;
    let [na, nb, nc] = summary.counters;
    println!("Project: {}", summary.name);
    println!("Classes: {a} ({na}), {b} ({nb}), {c} ({nc})");
    println!(
        "Active:  {}{}",
        summary.active_variant,
        if summary.ready { " (trained)" } else { "" }
    );
    println!("Saved:   {}", if summary.persistent { "permanent" } else { "temporary" });
    if !summary.trained_variants.is_empty() {
        let names: Vec<String> = summary
            .trained_variants
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("Models:  {}", names.join(", "));
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Init {
        name: String,
        labels: [String; 3],
        persistent: bool,
    },
    Save {
        name: String,
        class: i64,
        image: PathBuf,
    },
    Train {
        name: String,
    },
    Predict {
        name: String,
        image: PathBuf,
    },
    Rotate {
        name: String,
    },
    SaveAll {
        name: String,
    },
    Discard {
        name: String,
    },
    Load {
        name: String,
        labels: Option<[String; 3]>,
    },
    Export {
        name: String,
        path: PathBuf,
    },
    Import {
        name: String,
        path: PathBuf,
    },
}

#[derive(Debug)]
struct Options {
    config_path: Option<PathBuf>,
    backend: Option<StorageBackend>,
    root: Option<PathBuf>,
    db_path: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut config_path = None;
    let mut backend = None;
    let mut root = None;
    let mut db_path = None;
    let mut persistent = false;
    let mut positional = Vec::new();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--backend" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--backend requires a value".to_string())?;
                backend = Some(match value.as_str() {
                    "local" => StorageBackend::Local,
                    "document" => StorageBackend::Document,
                    other => return Err(format!("Unknown backend '{other}' (local|document)")),
                });
            }
            "--root" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--root requires a value".to_string())?;
                root = Some(PathBuf::from(value));
            }
            "--db" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--db requires a value".to_string())?;
                db_path = Some(PathBuf::from(value));
            }
            "--persistent" => persistent = true,
            flag if flag.starts_with("--") => {
                return Err(format!("Unknown argument: {flag}\n\n{}", help_text()));
            }
            value => positional.push(value.to_string()),
        }
        idx += 1;
    }
    if positional.is_empty() {
        println!("{}", help_text());
        return Ok(None);
    }
    let command = parse_command(positional, persistent)?;
    Ok(Some(Options {
        config_path,
        backend,
        root,
        db_path,
        command,
    }))
}

fn parse_command(positional: Vec<String>, persistent: bool) -> Result<Command, String> {
    let mut parts = positional.into_iter();
    let verb = parts.next().unwrap_or_default();
    let rest: Vec<String> = parts.collect();
    let arity = |expected: usize| -> Result<(), String> {
        if rest.len() == expected {
            Ok(())
        } else {
            Err(format!(
                "'{verb}' expects {expected} argument(s), got {}\n\n{}",
                rest.len(),
                help_text()
            ))
        }
    };
    let command = match verb.as_str() {
        "init" => {
            arity(4)?;
            Command::Init {
                name: rest[0].clone(),
                labels: [rest[1].clone(), rest[2].clone(), rest[3].clone()],
                persistent,
            }
        }
        "save" => {
            arity(3)?;
            let class = rest[1]
                .parse::<i64>()
                .map_err(|_| format!("Class must be 1, 2 or 3, got '{}'", rest[1]))?;
            Command::Save {
                name: rest[0].clone(),
                class,
                image: PathBuf::from(&rest[2]),
            }
        }
        "train" => {
            arity(1)?;
            Command::Train {
                name: rest[0].clone(),
            }
        }
        "predict" => {
            arity(2)?;
            Command::Predict {
                name: rest[0].clone(),
                image: PathBuf::from(&rest[1]),
            }
        }
        "rotate" => {
            arity(1)?;
            Command::Rotate {
                name: rest[0].clone(),
            }
        }
        "save-all" => {
            arity(1)?;
            Command::SaveAll {
                name: rest[0].clone(),
            }
        }
        "discard" => {
            arity(1)?;
            Command::Discard {
                name: rest[0].clone(),
            }
        }
        "load" => {
            let labels = match rest.len() {
                1 => None,
                4 => Some([rest[1].clone(), rest[2].clone(), rest[3].clone()]),
                _ => return Err(format!("'load' expects 1 or 4 argument(s)\n\n{}", help_text())),
            };
            Command::Load {
                name: rest[0].clone(),
                labels,
            }
        }
        "export" | "import" => {
            arity(2)?;
            let name = rest[0].clone();
            let path = PathBuf::from(&rest[1]);
            if verb == "export" {
                Command::Export { name, path }
            } else {
                Command::Import { name, path }
            }
        }
        other => return Err(format!("Unknown command '{other}'\n\n{}", help_text())),
    };
    Ok(command)
}

fn help_text() -> &'static str {
    "scribble [--config <path>] [--backend local|document] [--root <dir>] [--db <path>] <command>\n\n\
Commands:\n\
  init <name> <label1> <label2> <label3> [--persistent]\n\
  save <name> <class 1-3> <image>\n\
  train <name>\n\
  predict <name> <image>\n\
  rotate <name>\n\
  save-all <name>\n\
  discard <name>\n\
  load <name> [<label1> <label2> <label3>]\n\
  export <name> <path>\n\
  import <name> <path>"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_init_with_flags_anywhere() {
        let options = parse_args(args(&["--backend", "document", "init", "zoo", "a", "b", "--persistent", "c"]))
            .unwrap()
            .unwrap();
        assert_eq!(options.backend, Some(StorageBackend::Document));
        assert_eq!(
            options.command,
            Command::Init {
                name: "zoo".into(),
                labels: ["a".into(), "b".into(), "c".into()],
                persistent: true,
            }
        );
    }

    #[test]
    fn load_accepts_optional_labels() {
        let plain = parse_args(args(&["load", "zoo"])).unwrap().unwrap();
        assert_eq!(
            plain.command,
            Command::Load {
                name: "zoo".into(),
                labels: None
            }
        );
        assert!(parse_args(args(&["load", "zoo", "a"])).is_err());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(args(&["save", "zoo", "x", "img.png"])).is_err());
        assert!(parse_args(args(&["train"])).is_err());
        assert!(parse_args(args(&["fly", "zoo"])).is_err());
        assert!(parse_args(args(&["--backend", "cloud", "train", "zoo"])).is_err());
        assert!(parse_args(args(&["--wat"])).is_err());
    }
}
