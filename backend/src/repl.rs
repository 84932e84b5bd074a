//! Interactive editing session for `sheetsmith edit`.
//!
//! Free text is sent to the model service as an instruction; lines starting with `:` are
//! commands. Row numbers are 1-based, as shown in the `#` column.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sheetsmith_editor::{
    export_csv_file, render_table, CellEditBuffer, Cell, EditorSession, Position, Suggestion,
};

use crate::error::{CliError, CliResult};

pub const HELP: &str = "\
Type an instruction (e.g. \"drop rows where age is empty\") or a command:
  :apply [code]            apply the suggested snippet, or the given one
  :undo / :redo            step through history
  :show                    print the table
  :numbers                 toggle row numbers
  :set <row> <col> <value> edit one cell
  :add-row [start]         append (or prepend) an empty row
  :del-row <row>           delete a row
  :add-col <name> [start]  append (or prepend) an empty column
  :del-col <name>          delete a column
  :export <path>           write the table as CSV
  :help                    show this help
  :quit                    leave";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Instruction(String),
    Apply(Option<String>),
    Undo,
    Redo,
    Show,
    ToggleNumbers,
    Set { row: usize, column: String, value: String },
    AddRow(Position),
    DeleteRow(usize),
    AddColumn { name: String, position: Position },
    DeleteColumn(String),
    Export(PathBuf),
    Help,
    Quit,
    Empty,
}

fn usage(text: &str) -> CliError {
    CliError::Usage(format!("usage: {}", text))
}

/// 1-based row number to index.
fn row_number(raw: Option<&str>, syntax: &str) -> CliResult<usize> {
    raw.and_then(|r| r.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .map(|n| n - 1)
        .ok_or_else(|| usage(syntax))
}

fn position(raw: Option<&str>) -> Position {
    match raw {
        Some(p) if p.eq_ignore_ascii_case("start") => Position::Start,
        _ => Position::End,
    }
}

impl Command {
    pub fn parse(line: &str) -> CliResult<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Command::Empty);
        }
        let Some(command) = line.strip_prefix(':') else {
            return Ok(Command::Instruction(line.to_string()));
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        let mut args = rest.split_whitespace();

        let parsed = match name {
            "apply" => Command::Apply(Some(rest.to_string()).filter(|s| !s.is_empty())),
            "undo" => Command::Undo,
            "redo" => Command::Redo,
            "show" => Command::Show,
            "numbers" => Command::ToggleNumbers,
            "set" => {
                let mut parts = rest.splitn(3, char::is_whitespace);
                let row = row_number(parts.next(), ":set <row> <col> <value>")?;
                let column = parts
                    .next()
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| usage(":set <row> <col> <value>"))?;
                Command::Set {
                    row,
                    column: column.to_string(),
                    value: parts.next().unwrap_or("").trim().to_string(),
                }
            }
            "add-row" => Command::AddRow(position(args.next())),
            "del-row" => Command::DeleteRow(row_number(args.next(), ":del-row <row>")?),
            "add-col" => {
                let name = args.next().ok_or_else(|| usage(":add-col <name> [start]"))?;
                Command::AddColumn {
                    name: name.to_string(),
                    position: position(args.next()),
                }
            }
            "del-col" => Command::DeleteColumn(
                Some(rest)
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| usage(":del-col <name>"))?
                    .to_string(),
            ),
            "export" => Command::Export(PathBuf::from(
                Some(rest)
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| usage(":export <path>"))?,
            )),
            "help" | "h" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            other => return Err(CliError::Usage(format!("unknown command ':{}' (try :help)", other))),
        };
        Ok(parsed)
    }
}

/// What the caller should do after a line.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Output(String),
    Quit,
}

pub struct Repl {
    session: Arc<EditorSession>,
    edits: CellEditBuffer,
    show_numbers: bool,
    auto_apply: bool,
    pending: Option<String>,
}

impl Repl {
    pub fn new(session: Arc<EditorSession>, debounce: Duration) -> Self {
        Self {
            edits: CellEditBuffer::with_window(Arc::clone(&session), debounce),
            session,
            show_numbers: true,
            auto_apply: false,
            pending: None,
        }
    }

    /// Apply snippets as soon as the model suggests them.
    pub fn with_auto_apply(mut self, auto_apply: bool) -> Self {
        self.auto_apply = auto_apply;
        self
    }

    pub fn session(&self) -> &Arc<EditorSession> {
        &self.session
    }

    /// The snippet waiting for `:apply`.
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    fn table(&self) -> String {
        render_table(&self.session.current(), self.show_numbers)
    }

    /// Handle one input line.
    pub async fn handle(&mut self, line: &str) -> CliResult<Reply> {
        let output = match Command::parse(line)? {
            Command::Empty => String::new(),
            Command::Quit => {
                self.edits.flush()?;
                return Ok(Reply::Quit);
            }
            Command::Help => HELP.to_string(),
            Command::Instruction(text) => self.instruct(&text).await?,
            Command::Apply(code) => {
                let snippet = code
                    .or_else(|| self.pending.clone())
                    .ok_or_else(|| CliError::Usage("nothing to apply".to_string()))?;
                self.session.apply(&snippet).await?;
                self.pending = None;
                self.table()
            }
            Command::Undo => {
                if self.session.undo() {
                    self.table()
                } else {
                    "Nothing to undo".to_string()
                }
            }
            Command::Redo => {
                if self.session.redo() {
                    self.table()
                } else {
                    "Nothing to redo".to_string()
                }
            }
            Command::Show => self.table(),
            Command::ToggleNumbers => {
                self.show_numbers = !self.show_numbers;
                self.table()
            }
            Command::Set { row, column, value } => {
                self.edits.on_input(row, &column, Cell::from(value))?;
                // the command line losing focus ends the edit
                if self.edits.on_blur()? {
                    self.table()
                } else {
                    "Unchanged".to_string()
                }
            }
            Command::AddRow(position) => {
                self.session.insert_row(position)?;
                self.table()
            }
            Command::DeleteRow(index) => {
                self.session.remove_row(index)?;
                self.table()
            }
            Command::AddColumn { name, position } => {
                self.session.add_column(&name, position)?;
                self.table()
            }
            Command::DeleteColumn(name) => {
                self.session.remove_column(&name)?;
                self.table()
            }
            Command::Export(path) => {
                export_csv_file(&self.session.current(), &path)?;
                format!("Exported {} rows to {}", self.session.current().len(), path.display())
            }
        };
        Ok(Reply::Output(output))
    }

    async fn instruct(&mut self, text: &str) -> CliResult<String> {
        match self.session.request_transform(text).await? {
            Suggestion::Snippet(code) if self.auto_apply => {
                self.session.apply(&code).await?;
                Ok(format!("Applied: {}\n{}", code, self.table()))
            }
            Suggestion::Snippet(code) => {
                let out = format!("Suggested: {}\nType :apply to run it.", code);
                self.pending = Some(code);
                Ok(out)
            }
            Suggestion::Message(message) => Ok(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetsmith_editor::{Dataset, EngineRuntime, ErrorKind, Row, TransformFailure};

    fn repl() -> Repl {
        let session = EditorSession::new(Arc::new(EngineRuntime::default()));
        session.load(
            Dataset::from_rows(vec![
                Row::from_iter([("name", Cell::from("Bob")), ("age", Cell::from("30"))]),
                Row::from_iter([("name", Cell::from("Amy")), ("age", Cell::from(""))]),
            ])
            .unwrap(),
        );
        Repl::new(Arc::new(session), Duration::from_millis(500))
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  ").unwrap(), Command::Empty);
        assert_eq!(
            Command::parse("drop empty ages").unwrap(),
            Command::Instruction("drop empty ages".into())
        );
        assert_eq!(Command::parse(":apply").unwrap(), Command::Apply(None));
        assert_eq!(
            Command::parse(":apply df = df.head(1)").unwrap(),
            Command::Apply(Some("df = df.head(1)".into()))
        );
        assert_eq!(
            Command::parse(":set 2 name Amy Lee").unwrap(),
            Command::Set {
                row: 1,
                column: "name".into(),
                value: "Amy Lee".into()
            }
        );
        assert_eq!(Command::parse(":add-row start").unwrap(), Command::AddRow(Position::Start));
        assert_eq!(Command::parse(":del-row 1").unwrap(), Command::DeleteRow(0));
        assert_eq!(Command::parse(":q").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_errors() {
        for line in [":del-row 0", ":del-row x", ":set", ":set 1", ":export", ":frobnicate"] {
            assert!(matches!(Command::parse(line), Err(CliError::Usage(_))), "{}", line);
        }
    }

    #[tokio::test]
    async fn test_apply_undo_redo() {
        let mut repl = repl();
        let reply = repl.handle(":apply df = df.dropna(subset=['age'])").await.unwrap();
        assert!(matches!(reply, Reply::Output(ref t) if !t.contains("Amy")));
        assert_eq!(repl.session().current().len(), 1);

        repl.handle(":undo").await.unwrap();
        assert_eq!(repl.session().current().len(), 2);
        repl.handle(":redo").await.unwrap();
        assert_eq!(repl.session().current().len(), 1);
        assert_eq!(
            repl.handle(":redo").await.unwrap(),
            Reply::Output("Nothing to redo".into())
        );
    }

    #[tokio::test]
    async fn test_apply_without_pending_snippet() {
        let mut repl = repl();
        assert!(matches!(repl.handle(":apply").await, Err(CliError::Usage(_))));
    }

    #[tokio::test]
    async fn test_rejected_snippet_keeps_table() {
        let mut repl = repl();
        let err = repl.handle(":apply import os").await.unwrap_err();
        assert!(matches!(err, CliError::Transform(ref f) if f.kind() == ErrorKind::InvalidSnippet));
        assert_eq!(repl.session().history_len(), 1);
    }

    #[tokio::test]
    async fn test_edits() {
        let mut repl = repl();
        repl.handle(":set 1 name Rob").await.unwrap();
        assert_eq!(repl.session().current().cell(0, "name"), Some(&Cell::from("Rob")));
        assert_eq!(repl.handle(":set 1 name Rob").await.unwrap(), Reply::Output("Unchanged".into()));

        repl.handle(":add-col city").await.unwrap();
        repl.handle(":add-row").await.unwrap();
        repl.handle(":del-col age").await.unwrap();
        repl.handle(":del-row 2").await.unwrap();
        let current = repl.session().current();
        assert_eq!(current.columns(), vec!["name", "city"]);
        assert_eq!(current.len(), 2);

        let err = repl.handle(":del-col age").await.unwrap_err();
        assert!(matches!(err, CliError::Transform(TransformFailure::Edit(_))));
    }

    #[tokio::test]
    async fn test_instruction_without_model_service() {
        let mut repl = repl();
        let err = repl.handle("drop empty ages").await.unwrap_err();
        assert!(matches!(err, CliError::Transform(ref f) if f.kind() == ErrorKind::NetworkError));
    }

    #[tokio::test]
    async fn test_export_and_quit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut repl = repl();
        repl.handle(&format!(":export {}", path.display())).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "name,age\nBob,30\nAmy,\n");
        assert_eq!(repl.handle(":quit").await.unwrap(), Reply::Quit);
    }
}
