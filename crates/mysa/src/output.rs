//! Result printing for every command.
//!
//! A [`Printer`] is built once from the global flags. Lists render as a
//! `tabled` grid, JSON goes through serde, and plain mode prints one key per
//! line for shell pipelines.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

pub struct Printer {
    format: OutputFormat,
    quiet: bool,
    color: bool,
}

impl Printer {
    pub fn new(global: &GlobalOpts) -> Self {
        Self {
            format: global.output,
            quiet: global.quiet,
            color: color_enabled(global.color),
        }
    }

    /// An uncolored printer for `format`.
    #[cfg(test)]
    pub fn plain(format: OutputFormat) -> Self {
        Self {
            format,
            quiet: false,
            color: false,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Print a collection. `row` feeds the table, `key` the plain mode.
    pub fn rows<T, R>(
        &self,
        items: &[T],
        row: impl Fn(&T) -> R,
        key: impl Fn(&T) -> String,
    ) -> Result<(), CliError>
    where
        T: Serialize,
        R: Tabled,
    {
        let text = self.render_rows(items, row, key)?;
        self.line(&text);
        Ok(())
    }

    /// Print one record. `describe` is the human-readable table form.
    pub fn item<T: Serialize>(
        &self,
        item: &T,
        describe: impl Fn(&T) -> String,
        key: impl Fn(&T) -> String,
    ) -> Result<(), CliError> {
        let text = match self.format {
            OutputFormat::Table => describe(item),
            OutputFormat::Plain => key(item),
            OutputFormat::Json => to_json(item, false)?,
            OutputFormat::JsonCompact => to_json(item, true)?,
        };
        self.line(&text);
        Ok(())
    }

    /// A confirmation message, green on a color terminal.
    pub fn done(&self, message: &str) {
        if self.color {
            self.line(&message.green().to_string());
        } else {
            self.line(message);
        }
    }

    /// Label a streamed event line, e.g. `[status]`.
    pub fn tag(&self, label: &str) -> String {
        let tag = format!("[{label}]");
        if !self.color {
            return tag;
        }
        match label {
            "status" => tag.cyan().to_string(),
            "setpoint" => tag.yellow().to_string(),
            "state" => tag.magenta().to_string(),
            _ => tag.dimmed().to_string(),
        }
    }

    /// Write one line to stdout unless `--quiet`.
    pub fn line(&self, text: &str) {
        if self.quiet || text.is_empty() {
            return;
        }
        let _ = writeln!(io::stdout().lock(), "{text}");
    }

    fn render_rows<T, R>(
        &self,
        items: &[T],
        row: impl Fn(&T) -> R,
        key: impl Fn(&T) -> String,
    ) -> Result<String, CliError>
    where
        T: Serialize,
        R: Tabled,
    {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new(items.iter().map(row));
                Ok(table.with(Style::rounded()).to_string())
            }
            OutputFormat::Plain => Ok(items.iter().map(key).collect::<Vec<_>>().join("\n")),
            OutputFormat::Json => to_json(items, false),
            OutputFormat::JsonCompact => to_json(items, true),
        }
    }
}

fn color_enabled(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

pub fn to_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> Result<String, CliError> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[derive(Serialize)]
    struct Thermostat {
        id: &'static str,
        name: &'static str,
    }

    #[derive(Tabled)]
    struct IdOnly {
        #[tabled(rename = "Device")]
        id: String,
    }

    fn render(format: OutputFormat) -> String {
        let items = [
            Thermostat { id: "a", name: "Kitchen" },
            Thermostat { id: "b", name: "Office" },
        ];
        Printer::plain(format)
            .render_rows(&items, |t| IdOnly { id: t.id.into() }, |t| t.id.to_owned())
            .unwrap()
    }

    #[test]
    fn plain_prints_keys() {
        assert_eq!(render(OutputFormat::Plain), "a\nb");
    }

    #[test]
    fn compact_json_keeps_all_fields() {
        assert_eq!(
            render(OutputFormat::JsonCompact),
            r#"[{"id":"a","name":"Kitchen"},{"id":"b","name":"Office"}]"#
        );
    }

    #[test]
    fn table_uses_row_columns_only() {
        let table = render(OutputFormat::Table);
        assert!(table.contains("Device"));
        assert!(!table.contains("Kitchen"));
    }

    #[test]
    fn tags_without_color_are_bracketed() {
        assert_eq!(Printer::plain(OutputFormat::Table).tag("status"), "[status]");
    }
}
