//! Line-oriented operator console. Every command runs to completion before the
//! next line is read.

use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::ai::assistant::AssistantPipeline;
use crate::ai::vision::{ExtractionResult, VisionPipeline};
use crate::ai::GenerativeModel;
use crate::bootstrap::Services;
use crate::config::AppConfig;
use crate::media::UploadedImage;
use crate::tasks::recorder::TaskRecorder;
use crate::tasks::{DocumentStore, Priority, Task};

pub const DEFAULT_HINT: &str = "Inventory item";

const HELP: &str = "\
Commands:
  add <Low|Medium|High> <description>   record a pending RPA task
  list                                  show pending tasks
  analyze <image.jpg|png> [hint]        catalogue an inventory item from a photo
  ask <question>                        ask the operations assistant
  help                                  show this help
  quit                                  exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add {
        priority: Priority,
        description: String,
    },
    List,
    Analyze {
        path: String,
        hint: String,
    },
    Ask(String),
    Help,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb.to_ascii_lowercase().as_str() {
        "" => Ok(Command::Empty),
        "add" => {
            let (priority, description) = match rest.split_once(char::is_whitespace) {
                Some((p, d)) => (p, d.trim()),
                None => (rest, ""),
            };
            if priority.is_empty() {
                return Err("usage: add <Low|Medium|High> <description>".to_string());
            }
            Ok(Command::Add {
                priority: priority.parse::<Priority>()?,
                description: description.to_string(),
            })
        }
        "list" => Ok(Command::List),
        "analyze" => {
            let (path, hint) = match rest.split_once(char::is_whitespace) {
                Some((p, h)) => (p, h.trim()),
                None => (rest, ""),
            };
            if path.is_empty() {
                return Err("usage: analyze <image path> [hint]".to_string());
            }
            Ok(Command::Analyze {
                path: path.to_string(),
                hint: if hint.is_empty() {
                    DEFAULT_HINT.to_string()
                } else {
                    hint.to_string()
                },
            })
        }
        "ask" => Ok(Command::Ask(rest.to_string())),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command '{}'. Type 'help'.", other)),
    }
}

pub fn render_tasks(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No pending tasks.".to_string();
    }
    tasks
        .iter()
        .map(|t| {
            let created = t
                .created_at
                .map(|c| c.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "-".to_string());
            format!(
                "• {}\n  Priority: {} | ID: {} | Created: {}",
                t.description, t.priority, t.id, created
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_extraction(result: &ExtractionResult) -> String {
    match result {
        ExtractionResult::Success(value) => {
            let mut out = String::from("Analysis complete:\n");
            out.push_str(
                &serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            );
            let missing = result.missing_keys();
            if !missing.is_empty() {
                out.push_str(&format!("\nWarning: missing fields: {}", missing.join(", ")));
            }
            out
        }
        ExtractionResult::MalformedResponse(raw) => {
            format!("The AI returned malformed JSON. Raw response:\n{}", raw)
        }
        ExtractionResult::NoJsonFound(raw) => {
            format!("No JSON object found in the AI response. Raw response:\n{}", raw)
        }
        ExtractionResult::TransportError(msg) => {
            format!("Could not reach the AI service: {}", msg)
        }
    }
}

pub struct Dashboard<'a> {
    model: &'a dyn GenerativeModel,
    store: &'a dyn DocumentStore,
    config: &'a AppConfig,
}

impl<'a> Dashboard<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self::from_parts(&*services.model, &*services.store, &services.config)
    }

    pub fn from_parts(
        model: &'a dyn GenerativeModel,
        store: &'a dyn DocumentStore,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            model,
            store,
            config,
        }
    }

    fn recorder(&self) -> TaskRecorder<'_> {
        TaskRecorder::new(self.store, &self.config.task_collection)
    }

    /// Runs one command. Returns `false` when the operator asked to quit.
    pub async fn handle(&self, command: Command, out: &mut dyn Write) -> std::io::Result<bool> {
        match command {
            Command::Empty => {}
            Command::Quit => return Ok(false),
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Add {
                priority,
                description,
            } => match self.recorder().submit_task(&description, priority).await {
                Ok(Some(id)) => writeln!(out, "Task added with ID: {}", id)?,
                Ok(None) => {}
                Err(e) => {
                    log::error!("Failed to add task: {}", e);
                    writeln!(out, "Error adding task: {}", e)?;
                }
            },
            Command::List => {
                let tasks = match self.recorder().list_pending_tasks().await {
                    Ok(tasks) => tasks,
                    Err(e) => {
                        log::error!("Failed to read tasks: {}", e);
                        writeln!(out, "Error reading tasks: {}", e)?;
                        Vec::new()
                    }
                };
                writeln!(out, "{}", render_tasks(&tasks))?;
            }
            Command::Analyze { path, hint } => {
                match UploadedImage::open(Path::new(&path), self.config.max_image_width) {
                    Ok(image) => {
                        writeln!(out, "Analyzing {} ({}x{})...", path, image.width, image.height)?;
                        let result = VisionPipeline::new(self.model).extract(&image, &hint).await;
                        writeln!(out, "{}", render_extraction(&result))?;
                    }
                    Err(e) => writeln!(out, "Error processing image: {}", e)?,
                }
            }
            Command::Ask(query) => {
                let assistant =
                    AssistantPipeline::new(self.model, self.config.assistant_retry_policy());
                match assistant.ask(&query).await {
                    Some(answer) => writeln!(out, "{}", answer)?,
                    None if query.trim().is_empty() => {
                        writeln!(out, "Please type a question first.")?
                    }
                    None => writeln!(out, "The assistant could not answer. Try again later.")?,
                }
            }
        }
        Ok(true)
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let mut out = std::io::stdout();
        writeln!(out, "RPA Operations Dashboard (model: {})", self.model.model_name())?;
        writeln!(out, "{}", HELP)?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            write!(out, "> ")?;
            out.flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };

            let keep_going = match parse_command(&line) {
                Ok(command) => self.handle(command, &mut out).await?,
                Err(e) => {
                    writeln!(out, "{}", e)?;
                    true
                }
            };
            if !keep_going {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::tasks::TaskStatus;

    #[test]
    fn parses_add_with_multiword_description() {
        assert_eq!(
            parse_command("add High  Sync inventory AS/400 ").unwrap(),
            Command::Add {
                priority: Priority::High,
                description: "Sync inventory AS/400".to_string(),
            }
        );
        assert_eq!(
            parse_command("ADD alta").unwrap(),
            Command::Add {
                priority: Priority::High,
                description: String::new(),
            }
        );
        assert!(parse_command("add").is_err());
        assert!(parse_command("add urgent fix it").is_err());
    }

    #[test]
    fn analyze_defaults_the_hint() {
        assert_eq!(
            parse_command("analyze ./item.png").unwrap(),
            Command::Analyze {
                path: "./item.png".to_string(),
                hint: DEFAULT_HINT.to_string(),
            }
        );
        assert_eq!(
            parse_command("analyze shelf.jpg blue crate on shelf B").unwrap(),
            Command::Analyze {
                path: "shelf.jpg".to_string(),
                hint: "blue crate on shelf B".to_string(),
            }
        );
        assert!(parse_command("analyze").is_err());
    }

    #[test]
    fn misc_commands() {
        assert_eq!(parse_command("   ").unwrap(), Command::Empty);
        assert_eq!(parse_command("list").unwrap(), Command::List);
        assert_eq!(parse_command("exit").unwrap(), Command::Quit);
        assert_eq!(parse_command("ask").unwrap(), Command::Ask(String::new()));
        assert!(parse_command("delete 1")
            .unwrap_err()
            .contains("Unknown command"));
    }

    #[test]
    fn renders_task_list() {
        let tasks = vec![Task {
            id: "t1".to_string(),
            description: "Sync inventory".to_string(),
            priority: Priority::Medium,
            status: TaskStatus::Pending,
            created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()),
        }];
        assert_eq!(
            render_tasks(&tasks),
            "• Sync inventory\n  Priority: Medium | ID: t1 | Created: 2024-05-01 08:30 UTC"
        );
        assert_eq!(render_tasks(&[]), "No pending tasks.");
    }

    #[test]
    fn renders_extraction_outcomes() {
        let partial = ExtractionResult::Success(json!({ "elemento_identificado": "box" }));
        let text = render_extraction(&partial);
        assert!(text.starts_with("Analysis complete:"));
        assert!(text.contains("missing fields: cantidad_aproximada"));

        let raw = ExtractionResult::NoJsonFound("no idea".to_string());
        assert!(render_extraction(&raw).ends_with("no idea"));
    }
}
