//! Command line front end for threadline.
//!
//! # Responsibility
//! - Parse `<command> [args]` plus `--config PATH` before or after the
//!   command, and run one service call.
//! - Print results as JSON on stdout, errors on stderr.
//!
//! Exit codes: `0` success, `1` operation failure, `2` usage error.

use log::info;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use threadline_core::{
    init_from_config, open_service, CommentId, CommentService, Config, SortOrder,
    SqliteCommentStore, ThreadRequest,
};

const USAGE: &str = "usage: threadline [--config PATH] <command> [args]

commands:
  create <author> <content> [--parent ID]
  thread [--parent ID] [--limit N] [--offset N] [--sort asc|desc]
  show <id>
  delete <id>
  search <query> [--limit N] [--offset N]

--config PATH may also follow the command.";

#[derive(Debug, PartialEq)]
enum Command {
    Create {
        parent_id: Option<CommentId>,
        author: String,
        content: String,
    },
    Thread(ThreadRequest),
    Show(CommentId),
    Delete(CommentId),
    Search {
        query: String,
        limit: u32,
        offset: u32,
    },
}

#[derive(Debug, PartialEq)]
struct Invocation {
    config: Option<PathBuf>,
    command: Command,
}

fn main() -> ExitCode {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("{message}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(invocation) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::from(1)
        }
    }
}

fn run(invocation: Invocation) -> Result<serde_json::Value, String> {
    let config =
        Config::load_or_default(invocation.config.as_deref()).map_err(|err| err.to_string())?;
    init_from_config(&config.logging)?;
    let service = open_service(&config).map_err(|err| err.to_string())?;
    info!(
        "event=cli_start module=cli status=ok db={} version={}",
        config.database.path.display(),
        threadline_core::core_version()
    );
    execute(&service, invocation.command)
}

fn execute(
    service: &CommentService<SqliteCommentStore>,
    command: Command,
) -> Result<serde_json::Value, String> {
    let value = match command {
        Command::Create {
            parent_id,
            author,
            content,
        } => {
            let comment = service
                .create_comment(parent_id, &author, &content)
                .map_err(|err| err.to_string())?;
            serde_json::to_value(comment)
        }
        Command::Thread(request) => {
            let thread = service.get_thread(&request).map_err(|err| err.to_string())?;
            serde_json::to_value(thread)
        }
        Command::Show(id) => match service.get_comment(id).map_err(|err| err.to_string())? {
            Some(comment) => serde_json::to_value(comment),
            None => return Err(format!("comment not found: {id}")),
        },
        Command::Delete(id) => {
            let outcome = service
                .delete_thread_with_outcome(id)
                .map_err(|err| err.to_string())?;
            Ok(json!({
                "id": outcome.id,
                "affected": outcome.affected,
                "deleted_at": outcome.deleted_at,
            }))
        }
        Command::Search {
            query,
            limit,
            offset,
        } => {
            let hits = service
                .search_comments(&query, limit, offset)
                .map_err(|err| err.to_string())?;
            serde_json::to_value(hits)
        }
    };
    value.map_err(|err| format!("failed to encode output: {err}"))
}

fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut rest = args;
    let mut config = None;
    if rest.first().map(String::as_str) == Some("--config") {
        let path = rest.get(1).ok_or("--config requires a path")?;
        config = Some(PathBuf::from(path));
        rest = &rest[2..];
    }

    let (verb, tail) = rest.split_first().ok_or("missing command")?;
    let mut options = Options::parse(tail)?;
    if let Some(path) = options.take("--config") {
        if config.is_some() {
            return Err("--config given more than once".to_string());
        }
        config = Some(PathBuf::from(path));
    }
    let command = match verb.as_str() {
        "create" => {
            let parent_id = options.take_id("--parent")?;
            let [author, content] = options.positionals::<2>("create")?;
            Command::Create {
                parent_id,
                author,
                content,
            }
        }
        "thread" => {
            let parent_id = options.take_id("--parent")?;
            let limit = options.take_u32("--limit")?.unwrap_or(0);
            let offset = options.take_u32("--offset")?.unwrap_or(0);
            let sort = SortOrder::parse(&options.take("--sort").unwrap_or_default());
            options.positionals::<0>("thread")?;
            Command::Thread(ThreadRequest {
                parent_id,
                limit,
                offset,
                sort,
            })
        }
        "show" => {
            let [id] = options.positionals::<1>("show")?;
            Command::Show(parse_id(&id)?)
        }
        "delete" => {
            let [id] = options.positionals::<1>("delete")?;
            Command::Delete(parse_id(&id)?)
        }
        "search" => {
            let limit = options.take_u32("--limit")?.unwrap_or(0);
            let offset = options.take_u32("--offset")?.unwrap_or(0);
            let [query] = options.positionals::<1>("search")?;
            Command::Search {
                query,
                limit,
                offset,
            }
        }
        other => return Err(format!("unknown command `{other}`")),
    };
    options.finish()?;
    Ok(Invocation { config, command })
}

/// `--flag value` pairs and bare positionals of one command.
struct Options {
    flags: Vec<(String, String)>,
    positionals: Vec<String>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut flags = Vec::new();
        let mut positionals = Vec::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg.starts_with("--") {
                let value = iter
                    .next()
                    .ok_or_else(|| format!("{arg} requires a value"))?;
                flags.push((arg.clone(), value.clone()));
            } else {
                positionals.push(arg.clone());
            }
        }
        Ok(Self { flags, positionals })
    }

    fn take(&mut self, name: &str) -> Option<String> {
        let index = self.flags.iter().position(|(flag, _)| flag == name)?;
        Some(self.flags.remove(index).1)
    }

    fn take_id(&mut self, name: &str) -> Result<Option<CommentId>, String> {
        self.take(name).map(|raw| parse_id(&raw)).transpose()
    }

    fn take_u32(&mut self, name: &str) -> Result<Option<u32>, String> {
        self.take(name)
            .map(|raw| {
                raw.parse::<u32>()
                    .map_err(|_| format!("{name} expects a non-negative integer, got `{raw}`"))
            })
            .transpose()
    }

    fn positionals<const N: usize>(&mut self, verb: &str) -> Result<[String; N], String> {
        let values = std::mem::take(&mut self.positionals);
        let count = values.len();
        values
            .try_into()
            .map_err(|_| format!("`{verb}` expects {N} argument(s), got {count}"))
    }

    fn finish(self) -> Result<(), String> {
        match self.flags.first() {
            Some((flag, _)) => Err(format!("unknown option `{flag}`")),
            None => Ok(()),
        }
    }
}

fn parse_id(raw: &str) -> Result<CommentId, String> {
    raw.parse::<CommentId>()
        .map_err(|_| format!("invalid comment id `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::{parse_args, Command, Invocation};
    use std::path::PathBuf;
    use threadline_core::{SortOrder, ThreadRequest};

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parses_create_with_parent_and_config() {
        let parsed = parse_args(&args(&[
            "--config", "cfg.yaml", "create", "ann", "hello there", "--parent", "4",
        ]))
        .unwrap();
        assert_eq!(
            parsed,
            Invocation {
                config: Some(PathBuf::from("cfg.yaml")),
                command: Command::Create {
                    parent_id: Some(4),
                    author: "ann".to_string(),
                    content: "hello there".to_string(),
                },
            }
        );
    }

    #[test]
    fn parses_thread_defaults() {
        let parsed = parse_args(&args(&["thread", "--sort", "asc"])).unwrap();
        assert_eq!(
            parsed.command,
            Command::Thread(ThreadRequest::roots(0, 0, SortOrder::Asc))
        );
    }

    #[test]
    fn config_flag_is_accepted_after_the_command() {
        let parsed =
            parse_args(&args(&["thread", "--config", "cfg.yaml", "--limit", "5"])).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("cfg.yaml")));
        assert_eq!(
            parsed.command,
            Command::Thread(ThreadRequest::roots(5, 0, SortOrder::Desc))
        );

        let duplicated = parse_args(&args(&[
            "--config", "a.yaml", "show", "3", "--config", "b.yaml",
        ]));
        assert!(duplicated.is_err());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&["delete"])).is_err());
        assert!(parse_args(&args(&["delete", "abc"])).is_err());
        assert!(parse_args(&args(&["search", "rust", "--limit", "-1"])).is_err());
        assert!(parse_args(&args(&["search", "rust", "--color", "red"])).is_err());
    }
}
