//! `timebin functions` command handler

use std::io::Write;

use serde::Serialize;

use timebin_pipeline::{FunctionKind, FunctionRegistry};

use crate::cli::FunctionsArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `functions` command.
pub async fn execute(args: FunctionsArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let registry = FunctionRegistry::with_defaults();
    let report = FunctionsReport::build(&registry, args.kind.as_deref())?;
    writer.render(&report)
}

/// Registered function names grouped by kind.
#[derive(Debug, Serialize)]
pub struct FunctionsReport {
    pub kinds: Vec<FunctionGroup>,
}

#[derive(Debug, Serialize)]
pub struct FunctionGroup {
    pub kind: &'static str,
    pub names: Vec<String>,
}

impl FunctionsReport {
    /// Collect names from the registry, optionally for a single kind.
    pub fn build(registry: &FunctionRegistry, kind: Option<&str>) -> Result<Self, CliError> {
        let kinds: Vec<FunctionKind> = match kind {
            None => FunctionKind::ALL.to_vec(),
            Some(name) => {
                let found = FunctionKind::ALL
                    .into_iter()
                    .find(|k| k.as_str() == name)
                    .ok_or_else(|| {
                        let expected: Vec<_> =
                            FunctionKind::ALL.iter().map(|k| k.as_str()).collect();
                        CliError::Command(format!(
                            "unknown function kind: {name} (expected: {})",
                            expected.join(", ")
                        ))
                    })?;
                vec![found]
            }
        };

        let kinds = kinds
            .into_iter()
            .map(|kind| {
                let mut names: Vec<String> =
                    registry.names(kind).into_iter().map(str::to_owned).collect();
                names.sort_unstable();
                FunctionGroup {
                    kind: kind.as_str(),
                    names,
                }
            })
            .collect();
        Ok(Self { kinds })
    }
}

impl Render for FunctionsReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for (i, group) in self.kinds.iter().enumerate() {
            if i > 0 {
                writeln!(w)?;
            }
            writeln!(w, "{} ({})", group.kind.bold(), group.names.len())?;
            for name in &group.names {
                writeln!(w, "  {name}")?;
            }
        }
        Ok(())
    }
}
