//! Single-server command surface: commands act on the active server.
use teloxide::utils::command::BotCommands;
use tracing::info;

use super::replies;
use crate::notifications::format::{self, NO_ACTIVE_SERVER_HINT, escape};
use crate::registry::Target;
use crate::state::AppState;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Server monitoring commands:")]
pub enum LegacyCommand {
    #[command(description = "<ip>: set the monitored server")]
    SetIp(String),
    #[command(description = "<container>: set the monitored container")]
    SetContainer(String),
    #[command(description = "status, uptime, container logs and disk usage")]
    Status,
    #[command(description = "[container]: last 2000 lines of docker logs")]
    Logs(String),
    #[command(description = "list the output directory")]
    Output,
    #[command(description = "prune old output folders when disk space is low")]
    Prune,
    #[command(description = "show settings")]
    Settings,
    #[command(description = "<seconds>: set the check interval")]
    Interval(String),
    #[command(description = "pause periodic status reports")]
    Stop,
    #[command(description = "resume periodic status reports")]
    Resume,
    #[command(description = "show this help")]
    Help,
}

pub async fn handle(state: &AppState, cmd: LegacyCommand) -> Vec<String> {
    let reply = match cmd {
        LegacyCommand::Help => state.legacy_help(),
        LegacyCommand::SetIp(raw) => set_ip(state, &raw).await,
        cmd => match state.registry.active().await {
            Some(target) => on_active(state, &target, cmd).await,
            None => NO_ACTIVE_SERVER_HINT.to_string(),
        },
    };
    vec![reply]
}

async fn on_active(state: &AppState, target: &Target, cmd: LegacyCommand) -> String {
    match cmd {
        LegacyCommand::SetContainer(raw) => match raw.split_whitespace().collect::<Vec<_>>()[..] {
            [container] => match state.registry.set_workload(&target.host, container).await {
                Ok(_) => format!("Container set to {}.", escape(container)),
                Err(e) => escape(&e.to_string()),
            },
            _ => "Usage: /setcontainer &lt;container&gt;".to_string(),
        },
        LegacyCommand::Status => replies::status(state, target).await,
        LegacyCommand::Logs(raw) => match raw.split_whitespace().collect::<Vec<_>>()[..] {
            [] => replies::logs(state, target, None).await,
            [workload] => replies::logs(state, target, Some(workload)).await,
            _ => "Usage: /logs [container]".to_string(),
        },
        LegacyCommand::Output => replies::output(state, target).await,
        LegacyCommand::Prune => replies::prune(state, target).await,
        LegacyCommand::Settings => format::settings(target),
        LegacyCommand::Interval(raw) => interval(state, target, raw.trim()).await,
        LegacyCommand::Stop => toggle(state, target, false).await,
        LegacyCommand::Resume => toggle(state, target, true).await,
        LegacyCommand::Help | LegacyCommand::SetIp(_) => state.legacy_help(),
    }
}

async fn set_ip(state: &AppState, raw: &str) -> String {
    let [host] = raw.split_whitespace().collect::<Vec<_>>()[..] else {
        return "Usage: /setip &lt;ip&gt;".to_string();
    };
    match state.registry.activate(host).await {
        Ok((target, previous)) => {
            if let Some(previous) = previous {
                state.supervisor.stop(&previous).await;
            }
            state.supervisor.start(&target.host).await;
            info!(host = %target.host, "Active server changed.");
            format!("Monitored server set to {}.", escape(&target.host))
        }
        Err(e) => escape(&e.to_string()),
    }
}

async fn interval(state: &AppState, target: &Target, raw: &str) -> String {
    let Ok(seconds) = raw.parse::<u64>() else {
        return "Usage: /interval &lt;seconds&gt;".to_string();
    };
    match state.registry.set_interval(&target.host, seconds).await {
        Ok(_) => format!("Interval set to {seconds} seconds."),
        Err(e) => escape(&e.to_string()),
    }
}

async fn toggle(state: &AppState, target: &Target, enabled: bool) -> String {
    match state
        .registry
        .set_notifications_enabled(&target.host, enabled)
        .await
    {
        Ok(_) if enabled => "Periodic status reports resumed.".to_string(),
        Ok(_) => "Periodic status reports paused.".to_string(),
        Err(e) => escape(&e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Supervisor;
    use crate::monitor::tests::{harness, healthy_host};
    use std::sync::Arc;

    fn cmd(text: &str) -> LegacyCommand {
        LegacyCommand::parse(text, "uptimebot").unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(cmd("/setip 10.0.0.5"), LegacyCommand::SetIp("10.0.0.5".to_string()));
        assert_eq!(cmd("/status"), LegacyCommand::Status);
        assert_eq!(cmd("/logs"), LegacyCommand::Logs(String::new()));
    }

    #[tokio::test]
    async fn test_commands_need_an_active_server() {
        let h = harness(healthy_host());
        let state = AppState::new(Arc::new(Supervisor::new(h.ctx.clone())));

        for text in ["/status", "/output", "/settings", "/interval 30", "/stop"] {
            assert_eq!(handle(&state, cmd(text)).await, vec![NO_ACTIVE_SERVER_HINT]);
        }
    }

    #[tokio::test]
    async fn test_setip_moves_monitoring() {
        let h = harness(healthy_host());
        let state = AppState::new(Arc::new(Supervisor::new(h.ctx.clone())));

        assert_eq!(
            handle(&state, cmd("/setip 10.0.0.5")).await,
            vec!["Monitored server set to 10.0.0.5."]
        );
        assert!(state.supervisor.is_running("10.0.0.5").await);

        handle(&state, cmd("/interval 5")).await;
        assert_eq!(
            handle(&state, cmd("/interval 45")).await,
            vec!["Interval set to 45 seconds."]
        );

        handle(&state, cmd("/setip 10.0.0.6")).await;
        assert!(!state.supervisor.is_running("10.0.0.5").await);
        assert!(state.supervisor.is_running("10.0.0.6").await);

        let active = state.registry.active().await.unwrap();
        assert_eq!(active.host, "10.0.0.6");
        // The single-server layout carries the interval over.
        assert_eq!(active.interval_secs, 45);

        let settings = handle(&state, cmd("/settings")).await;
        assert!(settings[0].contains("<b>IP:</b> 10.0.0.6"));

        state.supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_setcontainer_and_logs() {
        let h = harness(healthy_host());
        let state = AppState::new(Arc::new(Supervisor::new(h.ctx.clone())));
        state.registry.activate("10.0.0.5").await.unwrap();

        assert_eq!(
            handle(&state, cmd("/setcontainer trainer")).await,
            vec!["Container set to trainer."]
        );
        assert_eq!(
            handle(&state, cmd("/logs")).await,
            vec!["Logs of trainer:\n<pre>step 100 done</pre>"]
        );
    }
}
