use std::fmt::Write;

use console::Style;
use porter_domain::{ApplyReport, ResourceOutcome, ResourceResult};

mod error;
mod options;

pub use error::ReportError;
pub use options::{ColorChoice, OutputFormat, RenderOptions};

/// Header printed above the list of manifest validation problems.
pub const VALIDATION_HEADER: &str =
    "the following error(s) were found while validating the porter.yaml file:";

pub const VALID_MANIFEST: &str = "The porter.yaml file is valid!";

pub const FORBIDDEN_HINT: &str = "You may have to update your GitHub secret token";

const BUILD_ERRORS_PREFIX: &str = "Errors while building:";

/// Render an apply report in the requested output format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_apply(
    report: &ApplyReport,
    format: OutputFormat,
    options: &RenderOptions,
) -> std::result::Result<String, ReportError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|source| ReportError::JsonSerialize { source }),
        OutputFormat::Text => Ok(render_apply_text(report, options)),
    }
}

/// One `\n- <error>` entry per problem, with nested bullet lists indented
/// under their entry.
#[must_use]
pub fn validation_error_list(errors: &[String]) -> String {
    errors.iter().fold(String::new(), |mut output, error| {
        let _ = write!(output, "\n- {}", error.replace("\n\n*", "\n  *"));
        output
    })
}

#[must_use]
pub fn render_validation_errors(errors: &[String], color: bool) -> String {
    let style = TextStyle::with_color(color);
    format!(
        "{}{}\n",
        style.error_prefix(VALIDATION_HEADER),
        validation_error_list(errors)
    )
}

#[must_use]
pub fn render_valid_manifest(color: bool) -> String {
    let style = TextStyle::with_color(color);
    format!("{}\n", style.add_label(VALID_MANIFEST))
}

/// Line written when an apply fails before or after the per-resource phase.
#[must_use]
pub fn render_build_error(message: &str, color: bool) -> String {
    let style = TextStyle::with_color(color);
    format!("{} {message}\n", style.error_prefix(BUILD_ERRORS_PREFIX))
}

/// Block written when one or more resources failed, one line per resource.
#[must_use]
pub fn render_consolidated_errors(errors: &[(String, String)], color: bool) -> String {
    let style = TextStyle::with_color(color);
    let mut output = format!("{}\n", style.error_prefix(BUILD_ERRORS_PREFIX));
    for (resource, error) in errors {
        let _ = writeln!(
            output,
            "  - {}: {}",
            style.primary_text(resource),
            style.error_detail(error)
        );
    }
    output
}

#[must_use]
pub fn forbidden_hint(color: bool) -> String {
    let style = TextStyle::with_color(color);
    style.warn_prefix(FORBIDDEN_HINT)
}

fn render_apply_text(report: &ApplyReport, options: &RenderOptions) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);

    append_header(&mut output, "apply", options.target.as_deref(), &style);

    if report.results.is_empty() {
        if report.errors.is_empty() {
            let _ = writeln!(output, "  Nothing to do.");
        }
        append_errors(&mut output, &report.errors, &style);
        return output;
    }

    let (active, unchanged): (Vec<&ResourceResult>, Vec<&ResourceResult>) = report
        .results
        .iter()
        .partition(|result| result.outcome != ResourceOutcome::Unchanged);

    let _ = writeln!(output);
    append_errors(&mut output, &report.errors, &style);
    for result in &active {
        append_result_line(&mut output, result, &style);
    }

    if options.verbose {
        for result in &unchanged {
            append_result_line(&mut output, result, &style);
        }
        if !report.execution_order.is_empty() {
            let _ = writeln!(
                output,
                "    {}",
                style.dim(&format!("order: {}", report.execution_order.join(" -> ")))
            );
        }
    } else if !unchanged.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "  {}",
            style.dim(&format!("{} unchanged", unchanged.len()))
        );
    }

    let _ = writeln!(output);
    let tally = ApplyTally::from_results(&report.results);
    let _ = writeln!(output, "{}", tally.format(&style));

    output
}

fn append_header(output: &mut String, command: &str, target: Option<&str>, style: &TextStyle) {
    let _ = write!(output, "{}", style.header_command(command));
    if let Some(target) = target {
        let _ = write!(output, " {}", style.header_target(target));
    }
    let _ = writeln!(output);
}

fn append_result_line(output: &mut String, result: &ResourceResult, style: &TextStyle) {
    let (symbol, label) = match result.outcome {
        ResourceOutcome::Applied => (
            style.add_symbol("+"),
            TextStyle::pad_label(&style.add_label("applied")),
        ),
        ResourceOutcome::Unchanged => (
            style.noop_symbol("="),
            TextStyle::pad_label(&style.noop_label("unchanged")),
        ),
        ResourceOutcome::Failed => (
            style.error_op_symbol("!"),
            TextStyle::pad_label(&style.error_op_label("failed")),
        ),
        ResourceOutcome::Skipped => (
            style.skip_symbol("-"),
            TextStyle::pad_label(&style.skip_label("skipped")),
        ),
    };
    let _ = writeln!(
        output,
        "  {symbol} {label}{} {}",
        style.primary_text(&result.name),
        style.dim(&format!("({})", result.driver))
    );

    if let Some(detail) = &result.error {
        let detail = if result.outcome == ResourceOutcome::Failed {
            style.error_detail(detail)
        } else {
            style.dim(detail)
        };
        let _ = writeln!(output, "                     {detail}");
    }
}

fn append_errors(output: &mut String, errors: &[String], style: &TextStyle) {
    if errors.is_empty() {
        return;
    }
    let _ = writeln!(output);
    for error in errors {
        let _ = writeln!(output, "  {} {error}", style.error_prefix("error:"));
    }
}

struct ApplyTally {
    applied: usize,
    failed: usize,
    skipped: usize,
    unchanged: usize,
}

impl ApplyTally {
    fn from_results(results: &[ResourceResult]) -> Self {
        let mut tally = Self {
            applied: 0,
            failed: 0,
            skipped: 0,
            unchanged: 0,
        };
        for result in results {
            match result.outcome {
                ResourceOutcome::Applied => tally.applied += 1,
                ResourceOutcome::Failed => tally.failed += 1,
                ResourceOutcome::Skipped => tally.skipped += 1,
                ResourceOutcome::Unchanged => tally.unchanged += 1,
            }
        }
        tally
    }

    fn format(&self, style: &TextStyle) -> String {
        let mut parts = Vec::new();
        if self.applied > 0 {
            parts.push(style.add_label(&format!("{} applied", self.applied)));
        }
        if self.failed > 0 {
            parts.push(style.error_op_label(&format!("{} failed", self.failed)));
        }
        if self.skipped > 0 {
            parts.push(style.skip_label(&format!("{} skipped", self.skipped)));
        }
        if self.unchanged > 0 {
            parts.push(style.dim(&format!("{} unchanged", self.unchanged)));
        }
        if parts.is_empty() {
            format!("{} nothing to do", style.tally_label("Applied:"))
        } else {
            format!("{} {}", style.tally_label("Applied:"), parts.join(", "))
        }
    }
}

const LABEL_WIDTH: usize = 16;

#[derive(Debug, Clone)]
struct TextStyle {
    color_enabled: bool,
    // Symbols
    add_sym_style: Style,
    skip_sym_style: Style,
    error_sym_style: Style,
    noop_sym_style: Style,
    // Labels
    add_label_style: Style,
    skip_label_style: Style,
    error_label_style: Style,
    noop_label_style: Style,
    // Content
    primary_style: Style,
    dim_style: Style,
    error_detail_style: Style,
    // Header
    header_cmd_style: Style,
    header_target_style: Style,
    // Prefixes
    warn_prefix_style: Style,
    error_prefix_style: Style,
    // Tally
    tally_label_style: Style,
}

impl TextStyle {
    fn new(choice: ColorChoice) -> Self {
        Self::with_color(choice.for_stdout())
    }

    fn with_color(enabled: bool) -> Self {
        Self {
            color_enabled: enabled,
            add_sym_style: Style::new().green().bold(),
            skip_sym_style: Style::new().yellow().bold(),
            error_sym_style: Style::new().red().bold(),
            noop_sym_style: Style::new().dim(),
            add_label_style: Style::new().green(),
            skip_label_style: Style::new().yellow(),
            error_label_style: Style::new().red(),
            noop_label_style: Style::new().dim(),
            primary_style: Style::new().white(),
            dim_style: Style::new().dim(),
            error_detail_style: Style::new().red(),
            header_cmd_style: Style::new().white().bold(),
            header_target_style: Style::new().dim(),
            warn_prefix_style: Style::new().yellow().bold(),
            error_prefix_style: Style::new().red().bold(),
            tally_label_style: Style::new().white().bold(),
        }
    }

    fn paint<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if self.color_enabled {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn pad_label(painted: &str) -> String {
        let visible_len = console::measure_text_width(painted);
        if visible_len < LABEL_WIDTH {
            format!("{painted}{}", " ".repeat(LABEL_WIDTH - visible_len))
        } else {
            format!("{painted} ")
        }
    }

    fn add_symbol(&self, s: &str) -> String {
        self.paint(&self.add_sym_style, s)
    }
    fn skip_symbol(&self, s: &str) -> String {
        self.paint(&self.skip_sym_style, s)
    }
    fn error_op_symbol(&self, s: &str) -> String {
        self.paint(&self.error_sym_style, s)
    }
    fn noop_symbol(&self, s: &str) -> String {
        self.paint(&self.noop_sym_style, s)
    }

    fn add_label(&self, s: &str) -> String {
        self.paint(&self.add_label_style, s)
    }
    fn skip_label(&self, s: &str) -> String {
        self.paint(&self.skip_label_style, s)
    }
    fn error_op_label(&self, s: &str) -> String {
        self.paint(&self.error_label_style, s)
    }
    fn noop_label(&self, s: &str) -> String {
        self.paint(&self.noop_label_style, s)
    }

    fn primary_text(&self, s: &str) -> String {
        self.paint(&self.primary_style, s)
    }
    fn dim(&self, s: &str) -> String {
        self.paint(&self.dim_style, s)
    }
    fn error_detail(&self, s: &str) -> String {
        self.paint(&self.error_detail_style, s)
    }

    fn header_command(&self, s: &str) -> String {
        self.paint(&self.header_cmd_style, s)
    }
    fn header_target(&self, s: &str) -> String {
        self.paint(&self.header_target_style, s)
    }

    fn warn_prefix(&self, s: &str) -> String {
        self.paint(&self.warn_prefix_style, s)
    }
    fn error_prefix(&self, s: &str) -> String {
        self.paint(&self.error_prefix_style, s)
    }

    fn tally_label(&self, s: &str) -> String {
        self.paint(&self.tally_label_style, s)
    }
}
