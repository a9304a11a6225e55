//! Line commands typed at the prompt.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use shared::domain::{ItemId, ListId};

pub const HELP: &str = "\
commands:
  lists                 refresh and show all lists
  new <name>            create a list
  rm <list id>          delete a list
  open <list id>        show one list
  add <label>           add an item to the open list
  del <item id>         delete an item from the open list
  toggle <item id>      flip an item's checked state
  back                  return to all lists
  upload <list id> <path>
  help
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Lists,
    New(String),
    Remove(ListId),
    Open(ListId),
    Add(String),
    Delete(ItemId),
    Toggle(ItemId),
    Back,
    Upload { list_id: ListId, path: PathBuf },
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb {
        "lists" | "ls" => Command::Lists,
        "new" => Command::New(required_text(rest, "new <name>")?),
        "rm" => Command::Remove(ListId(parse_id(rest, "rm <list id>")?)),
        "open" => Command::Open(ListId(parse_id(rest, "open <list id>")?)),
        "add" => Command::Add(required_text(rest, "add <label>")?),
        "del" => Command::Delete(ItemId(parse_id(rest, "del <item id>")?)),
        "toggle" => Command::Toggle(ItemId(parse_id(rest, "toggle <item id>")?)),
        "back" => Command::Back,
        "upload" => {
            let (list_id, path) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: upload <list id> <path>"))?;
            Command::Upload {
                list_id: ListId(parse_id(list_id, "upload <list id> <path>")?),
                path: PathBuf::from(path.trim()),
            }
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}', try 'help'"),
    };
    Ok(Some(command))
}

fn required_text(rest: &str, usage: &str) -> Result<String> {
    if rest.is_empty() {
        bail!("usage: {usage}");
    }
    Ok(rest.to_string())
}

fn parse_id(raw: &str, usage: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .with_context(|| format!("usage: {usage}"))
}
