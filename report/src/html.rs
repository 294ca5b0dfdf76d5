use std::fmt::Write;

use drill_summary_model::{ScenarioRun, StepStatus, SuiteRun, Verdict};

use crate::format;
use crate::text::status;

const STYLE: &str = r#"
body { font-family: sans-serif; margin: 2em; color: #222; }
table { border-collapse: collapse; margin: 0.5em 0 1.5em; }
th, td { border: 1px solid #ccc; padding: 0.3em 0.6em; text-align: left; }
th { background: #f3f3f3; }
.badge { display: inline-block; padding: 0.1em 0.6em; border-radius: 0.8em; color: #fff; font-weight: bold; }
.compliant { background: #2e7d32; }
.non-compliant { background: #c62828; }
.unknown { background: #757575; }
.failure { color: #c62828; }
.skipped { color: #757575; }
.bar { background: #1565c0; height: 0.8em; }
.errors li { color: #c62828; }
"#;

pub(crate) fn render(suite_run: &SuiteRun) -> Result<String, std::fmt::Error> {
    let mut out = String::new();

    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">")?;
    writeln!(
        out,
        "<title>Recovery drill: {}</title>",
        escape(suite_run.suite_name())
    )?;
    writeln!(out, "<style>{STYLE}</style>\n</head>\n<body>")?;

    writeln!(
        out,
        "<h1>Suite {} {}</h1>",
        escape(suite_run.suite_name()),
        badge(suite_run.compliance_verdict())
    )?;
    writeln!(
        out,
        "<p>Run <code>{}</code>{}, started {}, ended {}.</p>",
        escape(suite_run.id()),
        if suite_run.dry_run() { " (dry run)" } else { "" },
        format::timestamp(suite_run.started_at()),
        format::timestamp(suite_run.ended_at())
    )?;
    if suite_run.cancelled() {
        writeln!(
            out,
            "<p><strong>The drill was cancelled before every scenario finished.</strong></p>"
        )?;
    }

    write_summary(&mut out, suite_run)?;
    for scenario_run in suite_run.scenario_runs() {
        write_scenario(&mut out, scenario_run)?;
    }

    let errors = suite_run.all_errors();
    if !errors.is_empty() {
        writeln!(out, "<h2>Errors</h2>\n<ul class=\"errors\">")?;
        for error in &errors {
            writeln!(out, "<li>{}</li>", escape(error))?;
        }
        writeln!(out, "</ul>")?;
    }

    writeln!(out, "</body>\n</html>")?;

    Ok(out)
}

fn write_summary(out: &mut String, suite_run: &SuiteRun) -> std::fmt::Result {
    writeln!(out, "<h2>Scenarios</h2>")?;
    if suite_run.scenario_runs().is_empty() {
        return writeln!(out, "<p>No scenarios were run.</p>");
    }

    writeln!(
        out,
        "<table>\n<tr><th>Scenario</th><th>Verdict</th><th>Total</th><th>Target</th><th>Margin</th><th>Termination</th><th>Errors</th></tr>"
    )?;
    for scenario_run in suite_run.scenario_runs() {
        writeln!(
            out,
            "<tr><td><a href=\"#{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(scenario_run.id()),
            escape(scenario_run.scenario_name()),
            badge(scenario_run.compliance_verdict()),
            format::duration(scenario_run.total_duration_ms()),
            format::target(scenario_run),
            format::margin(scenario_run.compliance_margin_pct()),
            scenario_run.termination(),
            scenario_run.errors().len()
        )?;
    }
    writeln!(out, "</table>")
}

fn write_scenario(out: &mut String, scenario_run: &ScenarioRun) -> std::fmt::Result {
    writeln!(
        out,
        "<h2 id=\"{}\">{} {}</h2>",
        escape(scenario_run.id()),
        escape(scenario_run.scenario_name()),
        badge(scenario_run.compliance_verdict())
    )?;
    writeln!(
        out,
        "<p>{} of {} against {}, margin {}, {}{}.</p>",
        format::duration(scenario_run.total_duration_ms()),
        escape(scenario_run.kind()),
        format::target(scenario_run),
        format::margin(scenario_run.compliance_margin_pct()),
        scenario_run.termination(),
        if scenario_run.dry_run() { ", simulated" } else { "" }
    )?;

    if !scenario_run.bucket_durations().is_empty() {
        writeln!(
            out,
            "<table>\n<tr><th>Bucket</th><th>Time</th><th>Share</th><th></th></tr>"
        )?;
        for bucket in scenario_run.bucket_durations() {
            let share = format::share_pct(bucket.duration_ms, scenario_run.total_duration_ms());
            writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{share:.1}%</td><td><div class=\"bar\" style=\"width: {:.0}px\"></div></td></tr>",
                escape(&bucket.bucket),
                format::duration(bucket.duration_ms),
                share.clamp(0.0, 100.0) * 2.0
            )?;
        }
        writeln!(out, "</table>")?;
    }

    writeln!(
        out,
        "<table>\n<tr><th>Step</th><th>Bucket</th><th>Status</th><th>Time</th><th>Detail</th></tr>"
    )?;
    for step in scenario_run.step_results() {
        let class = match step.outcome.status {
            StepStatus::Success => "",
            StepStatus::Failure => " class=\"failure\"",
            StepStatus::Skipped => " class=\"skipped\"",
        };
        writeln!(
            out,
            "<tr{class}><td>{}{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&step.name),
            if step.critical { " <em>(critical)</em>" } else { "" },
            escape(&step.bucket),
            status(step.outcome.status),
            format::duration(step.outcome.measured_ms),
            escape(&step.outcome.detail)
        )?;
    }
    writeln!(out, "</table>")?;

    if !scenario_run.details().is_empty() {
        writeln!(out, "<table>\n<tr><th>Detail</th><th>Value</th></tr>")?;
        for (key, value) in scenario_run.details() {
            writeln!(
                out,
                "<tr><td>{}</td><td><code>{}</code></td></tr>",
                escape(key),
                escape(&value.to_string())
            )?;
        }
        writeln!(out, "</table>")?;
    }

    Ok(())
}

fn badge(verdict: Verdict) -> String {
    let class = match verdict {
        Verdict::Compliant => "compliant",
        Verdict::NonCompliant => "non-compliant",
        Verdict::Unknown => "unknown",
    };

    format!("<span class=\"badge {class}\">{verdict}</span>")
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }

    escaped
}
