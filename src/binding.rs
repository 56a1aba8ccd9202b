//! Presentation side of the explorer. Nothing else in the crate writes to a screen.

use crate::config::StyleConfig;
use crate::controller::{Command, ExplorationController};
use crate::info::InfoFields;
use crate::ledger::LedgerRow;
use crate::map::{CameraMove, MapView};
use crate::types::ZoneOption;
use std::io::{self, Write};

pub trait ViewBinding {
    fn render_info(&mut self, fields: &InfoFields) -> io::Result<()>;
    fn render_ledger(&mut self, rows: &[LedgerRow], total: &str) -> io::Result<()>;
    fn render_map(&mut self, map: &MapView) -> io::Result<()>;
    fn render_suggestions(&mut self, options: &[&ZoneOption]) -> io::Result<()>;
    fn render_help(&mut self) -> io::Result<()>;
}

/// Render revisions last pushed to the binding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Presented {
    info: Option<u64>,
    ledger: Option<u64>,
    map: Option<u64>,
}

impl Presented {
    /// Pushes every component whose revision moved since the last call.
    pub fn refresh<B: ViewBinding>(
        &mut self,
        controller: &ExplorationController,
        binding: &mut B,
    ) -> io::Result<()> {
        let info = controller.info();
        if self.info != Some(info.revision()) {
            binding.render_info(info.fields())?;
            self.info = Some(info.revision());
        }
        let ledger = controller.ledger();
        if self.ledger != Some(ledger.revision()) {
            binding.render_ledger(ledger.rows(), ledger.total_display())?;
            self.ledger = Some(ledger.revision());
        }
        let map = controller.map();
        if self.map != Some(map.revision()) {
            binding.render_map(map)?;
            self.map = Some(map.revision());
        }
        Ok(())
    }

    /// Forces the next refresh to push everything.
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }
}

/// Plain-text binding for the terminal explorer.
pub struct TerminalBinding<W: Write> {
    out: W,
    palette: StyleConfig,
}

impl<W: Write> TerminalBinding<W> {
    pub fn new(out: W, palette: StyleConfig) -> Self {
        Self { out, palette }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ViewBinding for TerminalBinding<W> {
    fn render_info(&mut self, fields: &InfoFields) -> io::Result<()> {
        writeln!(self.out, "[zone]")?;
        writeln!(self.out, "  postal code: {}", fields.postal_code)?;
        writeln!(self.out, "  place:       {}", fields.place)?;
        writeln!(self.out, "  state:       {}", fields.state)?;
        writeln!(self.out, "  population:  {}", fields.population)?;
        writeln!(self.out, "  manager:     {}", fields.manager)?;
        let add = if fields.add_enabled { "enabled" } else { "disabled" };
        writeln!(self.out, "  add:         {add}")
    }

    fn render_ledger(&mut self, rows: &[LedgerRow], total: &str) -> io::Result<()> {
        writeln!(self.out, "[selection]")?;
        for row in rows {
            writeln!(self.out, "  {:<24} {:>7} {:>12}", row.place, row.postal_code, row.population)?;
        }
        writeln!(self.out, "  {:<24} {:>7} {:>12}", "total", "", total)
    }

    fn render_map(&mut self, map: &MapView) -> io::Result<()> {
        let camera = match map.camera() {
            CameraMove::FlyToBounds(bounds) => {
                format!("fly to [{:.5}, {:.5}]..[{:.5}, {:.5}]", bounds.0.lat(), bounds.0.lng(), bounds.1.lat(), bounds.1.lng())
            }
            CameraMove::FlyTo { center, zoom } => {
                format!("fly to {:.5}, {:.5} @ z{zoom}", center.lat(), center.lng())
            }
            CameraMove::PanTo(center) => format!("pan to {:.5}, {:.5}", center.lat(), center.lng()),
        };
        writeln!(self.out, "[map] {camera}")?;
        for (code, rendered) in map.layer() {
            let fill = rendered.style.fill_color(&self.palette).unwrap_or("-");
            writeln!(self.out, "  {code:<7} {:<9} {fill}", format!("{:?}", rendered.style).to_lowercase())?;
        }
        Ok(())
    }

    fn render_suggestions(&mut self, options: &[&ZoneOption]) -> io::Result<()> {
        for option in options {
            writeln!(self.out, "  {:<7} {}", option.value, option.label)?;
        }
        if options.is_empty() {
            writeln!(self.out, "  no matching zones")?;
        }
        Ok(())
    }

    fn render_help(&mut self) -> io::Result<()> {
        writeln!(self.out, "{HELP}")
    }
}

pub const HELP: &str = "commands: search <code> | click <code> | add | delete <code> | center <code> | reset | zones <prefix> | show | help | quit";

/// Parses one line of terminal input.
pub fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?;
    let arg = parts.next().unwrap_or("").to_string();
    let command = match verb {
        "search" | "s" => Command::Search(arg),
        "click" => Command::Click(arg),
        "add" | "a" => Command::Add,
        "delete" | "d" => Command::Delete(arg),
        "center" | "c" => Command::Center(arg),
        "reset" => Command::Reset,
        "zones" | "z" => Command::Suggest(arg),
        "show" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        // a bare postal code is a search
        code if code.chars().all(|c| c.is_ascii_digit()) => Command::Search(code.to_string()),
        _ => return None,
    };
    Some(command)
}
