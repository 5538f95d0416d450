//! Progress presentation for resolution and enrichment spans.
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::style::ProgressStyle;

/// Style `span` as a spinner nested below its parent, e.g. a running
/// resolution.
pub fn set_sub_task(span: &Span, msg: &str) {
    span.pb_set_style(
        &ProgressStyle::with_template("  {span_child_prefix} {spinner:.blue} {wide_msg}")
            .unwrap_or(ProgressStyle::default_spinner()),
    );
    span.pb_set_message(msg);
}

/// Style `span` as a bar counting `len` units, e.g. parts of a solution.
pub fn set_bar(span: &Span, msg: &str, len: u64) {
    let style = ProgressStyle::with_template(
        "{elapsed} ░ {prefix} ░ {bar:30.green/black} {pos}/{len} ░ {msg}",
    )
    .unwrap_or(ProgressStyle::default_bar())
    .progress_chars("█▒ ");
    span.pb_set_style(&style);
    span.pb_set_message(msg);
    span.pb_set_length(len);
}

/// Advance the bar of `span` by one unit.
pub fn tick(span: &Span) {
    span.pb_inc(1);
}
