//! Telegram HTML rendering of probe results and registry state.
//!
//! Remote output is untrusted text: it is truncated, stripped of `|...|`
//! segments and escaped here, and nowhere else.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::probe::{CleanupReport, CleanupStatus, ProbeReport};
use crate::registry::Target;

/// Telegram rejects longer messages.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Upper bound for one escaped block of remote output inside a message.
pub const MAX_OUTPUT_CHARS: usize = 3500;

/// Bound for one-line remote output such as uptime or a `df` row.
const SHORT_OUTPUT_CHARS: usize = 256;

static PIPE_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|[^|]+?\|").expect("pipe segment pattern"));

/// Strips `|...|` segments, then escapes for HTML parse mode.
pub fn sanitize(raw: &str) -> String {
    let stripped = PIPE_SEGMENT.replace_all(raw, "");
    escape(&stripped).replace('|', "&#124;")
}

/// Escapes `&`, `<` and `>`.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Keeps the last `max_chars` characters.
pub fn truncate_tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}

/// Keeps the first `max_chars` characters.
pub fn truncate_head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Sanitizes the longest suffix of `text` that is at most `budget`
/// characters once sanitized.
fn fit_tail(text: &str, budget: usize) -> String {
    fit(text, budget, truncate_tail)
}

/// Like [`fit_tail`], keeping a prefix.
fn fit_head(text: &str, budget: usize) -> String {
    fit(text, budget, truncate_head)
}

fn fit(text: &str, budget: usize, cut: fn(&str, usize) -> &str) -> String {
    let fits = |n: usize| {
        let sanitized = sanitize(cut(text, n));
        (sanitized.chars().count() <= budget).then_some(sanitized)
    };
    let mut hi = text.chars().count();
    if let Some(whole) = fits(hi) {
        return whole;
    }
    // Bisect on the raw length; only checked cuts are returned.
    let mut lo = 0;
    hi -= 1;
    while lo < hi {
        let mid = (lo + hi).div_ceil(2);
        if fits(mid).is_some() {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    fits(lo).unwrap_or_default()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn label(target: &Target) -> String {
    format!("{} ({})", escape(&target.name), escape(&target.host))
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "active" } else { "paused" }
}

/// Deployment-specific parts of rendered messages.
#[derive(Debug, Clone)]
pub struct ReportFormat {
    pub volume: String,
    pub output_dir: String,
    pub disk_warn_percent: u8,
}

impl ReportFormat {
    /// The status report used for healthy cycles and on-demand status.
    ///
    /// The `docker ps` and log blocks share whatever the rest of the message
    /// leaves of [`MAX_MESSAGE_CHARS`]. The log keeps its tail.
    pub fn status(&self, target: &Target, report: &ProbeReport) -> String {
        let mut head = self.disk_warning(report).unwrap_or_default();
        head.push_str(&format!(
            "<b>Server {} is ONLINE</b>\n<b>Uptime:</b> <code>{}</code>\n\n<b>docker ps</b>\n<pre>",
            label(target),
            fit_head(&report.uptime, SHORT_OUTPUT_CHARS)
        ));

        let disk = match &report.disk.row {
            Some(row) => format!("{}\n{}", report.disk.header, row),
            None => format!("{}\n(not found)", report.disk.header),
        };
        let mut middle = format!(
            "</pre>\n<b>df -h {}</b>\n<pre>{}</pre>\n",
            escape(&self.volume),
            fit_head(&disk, 2 * SHORT_OUTPUT_CHARS)
        );
        let log_tail = match &report.workload {
            Some(workload) => {
                middle.push_str(&format!(
                    "<b>docker logs {} (last 20 lines)</b>\n<pre>",
                    escape(&workload.name)
                ));
                Some(workload.log_tail.as_str())
            }
            None => {
                middle.push_str("<i>No container set. Use /sc &lt;name&gt; &lt;container&gt;.</i>");
                None
            }
        };

        let mut tail = String::new();
        if log_tail.is_some() {
            tail.push_str("</pre>");
        }
        if let Some(CleanupStatus::Pruned { removed, available_gib }) = &report.cleanup {
            if !removed.is_empty() {
                tail.push_str(&format!(
                    "\n<i>Low disk space ({available_gib} GiB free): removed {}</i>",
                    fit_head(&removed.join(", "), 2 * SHORT_OUTPUT_CHARS)
                ));
            }
        }

        let room = MAX_MESSAGE_CHARS
            .saturating_sub(char_len(&head) + char_len(&middle) + char_len(&tail));
        let log_wanted = log_tail
            .map(|text| fit_tail(text, room.min(MAX_OUTPUT_CHARS)))
            .unwrap_or_default();
        // The listing gets at least half the room, more when the log is short.
        let listing_budget = (room / 2).max(room.saturating_sub(char_len(&log_wanted)));
        let listing = fit_head(&report.workloads, listing_budget.min(MAX_OUTPUT_CHARS));
        let log_room = room.saturating_sub(char_len(&listing));
        let log = match log_tail {
            Some(text) if char_len(&log_wanted) > log_room => fit_tail(text, log_room),
            _ => log_wanted,
        };

        format!("{head}{listing}{middle}{log}{tail}")
    }

    fn disk_warning(&self, report: &ProbeReport) -> Option<String> {
        let used = report.disk.used_percent?;
        (used > self.disk_warn_percent).then(|| {
            format!(
                "<b>⚠️ WARNING: {} usage is at {used}% (above {}%)! Please make space!</b>\n",
                escape(&self.volume),
                self.disk_warn_percent
            )
        })
    }

    pub fn cleanup(&self, target: &Target, report: &CleanupReport) -> String {
        if !report.triggered {
            return format!(
                "{}: {} GiB free on {}, no pruning needed.",
                label(target),
                report.available_gib,
                escape(&self.volume)
            );
        }
        if report.removed.is_empty() {
            return format!(
                "{}: only {} GiB free on {}, but there are no old output folders to remove.",
                label(target),
                report.available_gib,
                escape(&self.volume)
            );
        }
        format!(
            "{}: {} GiB free on {}. Removed:\n<pre>{}</pre>",
            label(target),
            report.available_gib,
            escape(&self.volume),
            fit_head(&report.removed.join("\n"), MAX_OUTPUT_CHARS)
        )
    }

    pub fn output_listing(&self, listing: &str) -> String {
        format!(
            "<b>ls -lh {}</b>\n<pre>{}</pre>",
            escape(&self.output_dir),
            fit_head(listing, MAX_OUTPUT_CHARS)
        )
    }
}

pub fn workload_down(target: &Target, workload: &str) -> String {
    format!(
        "<b>🚨 Container DOWN!</b>\n<b>Container <code>{}</code> is NOT running on {}!</b>\nPlease check!",
        escape(workload),
        label(target)
    )
}

pub fn unreachable(target: &Target, detail: &str) -> String {
    format!(
        "<b>🚨🚨🚨 SERVER OFFLINE! 🚨🚨🚨</b>\n<b>Server {} is OFFLINE!</b>\n<b>Error:</b> <code>{}</code>\n<b>PLEASE CHECK IMMEDIATELY!</b>",
        label(target),
        sanitize(detail)
    )
}

/// Short form used as a command reply.
pub fn offline(target: &Target, detail: &str) -> String {
    format!("Server {} is OFFLINE! Error: {}", label(target), sanitize(detail))
}

pub fn cleanup_failed(target: &Target, detail: &str) -> String {
    format!("Pruning failed on {}: {}", label(target), sanitize(detail))
}

pub fn logs(workload: &str, text: &str) -> String {
    format!(
        "Logs of {}:\n<pre>{}</pre>",
        escape(workload),
        fit_tail(text, MAX_OUTPUT_CHARS)
    )
}

pub fn target_list(targets: &[Target]) -> String {
    if targets.is_empty() {
        return "No servers registered.".to_string();
    }
    let lines: Vec<String> = targets
        .iter()
        .map(|t| {
            format!(
                "{} - Container: {}",
                label(t),
                t.workload.as_deref().map(escape).unwrap_or_else(|| "-".to_string())
            )
        })
        .collect();
    format!("<b>All servers:</b>\n{}", lines.join("\n"))
}

pub fn settings(target: &Target) -> String {
    format!(
        "<b>Settings for {}:</b>\n<b>IP:</b> {}\n<b>Container:</b> {}\n<b>Interval:</b> {} seconds\n<b>Periodic status reports:</b> {}",
        escape(&target.name),
        escape(&target.host),
        target.workload.as_deref().map(escape).unwrap_or_else(|| "Not set".to_string()),
        target.interval_secs,
        on_off(target.notifications_enabled)
    )
}

pub fn all_settings(targets: &[Target]) -> String {
    if targets.is_empty() {
        return "No servers registered.".to_string();
    }
    let mut msg = "<b>All settings:</b>\n".to_string();
    for t in targets {
        msg.push_str(&format!(
            "\n<b>{}</b>\nContainer: {}\nInterval: {} seconds\nPeriodic status reports: {}\n",
            label(t),
            t.workload.as_deref().map(escape).unwrap_or_else(|| "-".to_string()),
            t.interval_secs,
            on_off(t.notifications_enabled)
        ));
    }
    msg
}

pub const EMPTY_REGISTRY_HINT: &str = "Please add a server with /add &lt;ip&gt; &lt;name&gt;.";
pub const NO_ACTIVE_SERVER_HINT: &str = "No active server. Use /setip &lt;ip&gt; first.";

pub fn help(volume: &str, output_dir: &str, threshold_gib: u64) -> String {
    format!(
        "<b>🛠️ UptimeBot help</b>\n\n\
         <b>🔹 General</b>\n\
         /help – Show this help\n\
         /list – List all registered servers\n\n\
         <b>➕ Servers</b>\n\
         /add &lt;ip&gt; &lt;name&gt; – Add a server and start monitoring it\n\
         /remove &lt;name&gt; – Remove a server\n\n\
         <b>⚙️ Settings</b>\n\
         /settings – Show the settings of all servers\n\
         /settings &lt;name&gt; – Show the settings of one server\n\
         /interval &lt;name&gt; &lt;seconds&gt; – Set the check interval of a server\n\n\
         <b>📦 Containers</b>\n\
         /sc &lt;name&gt; &lt;container&gt; – Set the container of a server\n\
         /logs &lt;name&gt; [container] – Show the last 2000 lines of docker logs\n\
         /output &lt;name&gt; – Show <code>ls -lh {}</code> on the server\n\n\
         <b>🔄 Status</b>\n\
         /s [name] – Show status, uptime, container logs and disk usage\n\
         /prune &lt;name&gt; – Prune output folders when {} has less than {} GiB free\n\n\
         <b>⏸️/▶️ Notifications</b>\n\
         /stop &lt;name&gt; – Pause periodic status reports for a server\n\
         /resume &lt;name&gt; – Resume periodic status reports for a server\n\n\
         <i>Alerts for offline servers and stopped containers are always sent. \
         Names and containers must match exactly.</i>",
        escape(output_dir),
        escape(volume),
        threshold_gib
    )
}

pub fn legacy_help(volume: &str, output_dir: &str, threshold_gib: u64) -> String {
    format!(
        "<b>🛠️ UptimeBot help</b>\n\n\
         /setip &lt;ip&gt; – Set the monitored server\n\
         /setcontainer &lt;container&gt; – Set the monitored container\n\
         /status – Show status, uptime, container logs and disk usage\n\
         /logs [container] – Show the last 2000 lines of docker logs\n\
         /output – Show <code>ls -lh {}</code>\n\
         /prune – Prune output folders when {} has less than {} GiB free\n\
         /settings – Show the current settings\n\
         /interval &lt;seconds&gt; – Set the check interval\n\
         /stop – Pause periodic status reports\n\
         /resume – Resume periodic status reports\n\
         /help – Show this help",
        escape(output_dir),
        escape(volume),
        threshold_gib
    )
}
