//! Text command grammar
//!
//! Case-sensitive names, whitespace-delimited arguments. Ids are unsigned
//! decimal integers; query text is the remaining tokens joined by one space.

use crate::error::CommandError;
use ctxmesh_common::ContextId;
use std::str::FromStr;

/// A parsed console command. Server ids are range-checked at dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { context: ContextId },
    Query { context: ContextId, text: String },
    Choose { context: ContextId, server: u64 },
    View { context: ContextId },
    ViewAll,
    FailLink { src: u64, dest: u64 },
    FixLink { src: u64, dest: u64 },
    FailNode { node: u64 },
    Resync { context: ContextId },
}

impl Command {
    pub const fn name(&self) -> &'static str {
        match self {
            Command::Create { .. } => "create",
            Command::Query { .. } => "query",
            Command::Choose { .. } => "choose",
            Command::View { .. } => "view",
            Command::ViewAll => "viewall",
            Command::FailLink { .. } => "failLink",
            Command::FixLink { .. } => "fixLink",
            Command::FailNode { .. } => "failNode",
            Command::Resync { .. } => "resync",
        }
    }

    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let name = tokens
            .next()
            .ok_or_else(|| CommandError::BadArguments("empty command".to_string()))?;
        let args: Vec<&str> = tokens.collect();

        match name {
            "create" => {
                let [context] = exact::<1>(name, &args)?;
                Ok(Command::Create {
                    context: context_id(context)?,
                })
            }
            "query" => {
                let (context, words) = args.split_first().ok_or_else(|| usage(name))?;
                if words.is_empty() {
                    return Err(CommandError::BadArguments(
                        "query text must not be empty".to_string(),
                    ));
                }
                Ok(Command::Query {
                    context: context_id(context)?,
                    text: words.join(" "),
                })
            }
            "choose" => {
                let [context, server] = exact::<2>(name, &args)?;
                Ok(Command::Choose {
                    context: context_id(context)?,
                    server: number(server)?,
                })
            }
            "view" => {
                let [context] = exact::<1>(name, &args)?;
                Ok(Command::View {
                    context: context_id(context)?,
                })
            }
            "viewall" => {
                exact::<0>(name, &args)?;
                Ok(Command::ViewAll)
            }
            "failLink" | "fixLink" => {
                let [src, dest] = exact::<2>(name, &args)?;
                let (src, dest) = (number(src)?, number(dest)?);
                Ok(if name == "failLink" {
                    Command::FailLink { src, dest }
                } else {
                    Command::FixLink { src, dest }
                })
            }
            "failNode" => {
                let [node] = exact::<1>(name, &args)?;
                Ok(Command::FailNode {
                    node: number(node)?,
                })
            }
            "resync" => {
                let [context] = exact::<1>(name, &args)?;
                Ok(Command::Resync {
                    context: context_id(context)?,
                })
            }
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

fn usage(name: &str) -> CommandError {
    let shape = match name {
        "create" => "create <context_id>",
        "query" => "query <context_id> <query...>",
        "choose" => "choose <context_id> <server_id>",
        "view" => "view <context_id>",
        "viewall" => "viewall",
        "failLink" => "failLink <src> <dest>",
        "fixLink" => "fixLink <src> <dest>",
        "failNode" => "failNode <node_num>",
        "resync" => "resync <context_id>",
        _ => name,
    };
    CommandError::BadArguments(format!("usage: {}", shape))
}

fn exact<'a, const N: usize>(name: &str, args: &[&'a str]) -> Result<[&'a str; N], CommandError> {
    <[&str; N]>::try_from(args).map_err(|_| usage(name))
}

fn number(token: &str) -> Result<u64, CommandError> {
    // `u64::from_str` accepts a leading '+', which the grammar does not
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CommandError::BadArguments(format!(
            "expected a non-negative integer, got {:?}",
            token
        )));
    }
    token
        .parse()
        .map_err(|_| CommandError::BadArguments(format!("integer out of range: {}", token)))
}

fn context_id(token: &str) -> Result<ContextId, CommandError> {
    number(token).map(ContextId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxmesh_common::ErrorKind;

    fn kind(line: &str) -> ErrorKind {
        Command::parse(line).unwrap_err().kind()
    }

    #[test]
    fn test_parse_all_shapes() {
        assert_eq!(
            Command::parse("create 1").unwrap(),
            Command::Create {
                context: ContextId(1)
            }
        );
        assert_eq!(
            Command::parse("query 1 What   is the weather?").unwrap(),
            Command::Query {
                context: ContextId(1),
                text: "What is the weather?".to_string()
            }
        );
        assert_eq!(
            Command::parse("choose 1 0").unwrap(),
            Command::Choose {
                context: ContextId(1),
                server: 0
            }
        );
        assert_eq!(
            Command::parse("  view 12 ").unwrap(),
            Command::View {
                context: ContextId(12)
            }
        );
        assert_eq!(Command::parse("viewall").unwrap(), Command::ViewAll);
        assert_eq!(
            Command::parse("failLink 0 1").unwrap(),
            Command::FailLink { src: 0, dest: 1 }
        );
        assert_eq!(
            Command::parse("fixLink 2 1").unwrap(),
            Command::FixLink { src: 2, dest: 1 }
        );
        assert_eq!(
            Command::parse("failNode 1").unwrap(),
            Command::FailNode { node: 1 }
        );
        assert_eq!(
            "resync 3".parse::<Command>().unwrap(),
            Command::Resync {
                context: ContextId(3)
            }
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(kind("delete 1"), ErrorKind::UnknownCommand);
        // Names are case-sensitive
        assert_eq!(kind("faillink 0 1"), ErrorKind::UnknownCommand);
        assert_eq!(kind("VIEWALL"), ErrorKind::UnknownCommand);
    }

    #[test]
    fn test_bad_arguments() {
        for line in [
            "",
            "   ",
            "create",
            "create 1 2",
            "create one",
            "create -1",
            "create +1",
            "query 1",
            "query x hello",
            "choose 1",
            "choose 1 a",
            "view",
            "viewall now",
            "failLink 0",
            "failNode",
            "failNode 99999999999999999999999",
        ] {
            assert_eq!(kind(line), ErrorKind::BadArguments, "line {:?}", line);
        }
    }

    #[test]
    fn test_usage_message() {
        let err = Command::parse("choose 1").unwrap_err();
        assert!(err.to_string().contains("choose <context_id> <server_id>"));
    }
}
