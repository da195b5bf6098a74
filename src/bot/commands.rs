//! Multi-server command surface: every command names its server.
use futures::future::join_all;
use teloxide::utils::command::BotCommands;
use tracing::info;

use super::replies;
use crate::notifications::format::{self, escape};
use crate::registry::Target;
use crate::state::AppState;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Server monitoring commands:")]
pub enum Command {
    #[command(description = "show this help")]
    Help,
    #[command(description = "list all registered servers")]
    List,
    #[command(description = "<ip> <name>: add a server and start monitoring it")]
    Add(String),
    #[command(description = "<name>: remove a server")]
    Remove(String),
    #[command(rename = "sc", description = "<name> <container>: set the container of a server")]
    SetContainer(String),
    #[command(rename = "s", description = "[name]: status of one or all servers")]
    Status(String),
    #[command(description = "<name> [container]: last 2000 lines of docker logs")]
    Logs(String),
    #[command(description = "<name>: list the output directory")]
    Output(String),
    #[command(description = "<name>: prune old output folders when disk space is low")]
    Prune(String),
    #[command(description = "[name]: show settings")]
    Settings(String),
    #[command(description = "<name> <seconds>: set the check interval")]
    Interval(String),
    #[command(description = "<name>: pause periodic status reports")]
    Stop(String),
    #[command(description = "<name>: resume periodic status reports")]
    Resume(String),
}

fn usage(line: &str) -> Vec<String> {
    vec![format!("Usage: {}", escape(line))]
}

fn args(raw: &str) -> Vec<&str> {
    raw.split_whitespace().collect()
}

async fn resolve(state: &AppState, name: &str) -> Result<Target, Vec<String>> {
    state
        .registry
        .resolve(name)
        .await
        .map_err(|e| vec![escape(&e.to_string())])
}

/// Runs one command and returns the HTML replies, in order.
pub async fn handle(state: &AppState, cmd: Command) -> Vec<String> {
    let result = match cmd {
        Command::Help => Ok(vec![state.help()]),
        Command::List => Ok(vec![format::target_list(&state.registry.list().await)]),
        Command::Add(raw) => add(state, &raw).await,
        Command::Remove(raw) => remove(state, &raw).await,
        Command::SetContainer(raw) => set_container(state, &raw).await,
        Command::Status(raw) => status(state, &raw).await,
        Command::Logs(raw) => logs(state, &raw).await,
        Command::Output(raw) => match args(&raw)[..] {
            [name] => match resolve(state, name).await {
                Ok(target) => Ok(vec![replies::output(state, &target).await]),
                Err(reply) => Err(reply),
            },
            _ => Err(usage("/output <name>")),
        },
        Command::Prune(raw) => match args(&raw)[..] {
            [name] => match resolve(state, name).await {
                Ok(target) => Ok(vec![replies::prune(state, &target).await]),
                Err(reply) => Err(reply),
            },
            _ => Err(usage("/prune <name>")),
        },
        Command::Settings(raw) => settings(state, &raw).await,
        Command::Interval(raw) => interval(state, &raw).await,
        Command::Stop(raw) => toggle(state, &raw, false).await,
        Command::Resume(raw) => toggle(state, &raw, true).await,
    };
    result.unwrap_or_else(|reply| reply)
}

type Replies = Result<Vec<String>, Vec<String>>;

async fn add(state: &AppState, raw: &str) -> Replies {
    let [host, name] = args(raw)[..] else {
        return Err(usage("/add <ip> <name>"));
    };
    let target = state.registry.register(host, name).await.map_err(|e| {
        vec![match e {
            crate::registry::RegistryError::AlreadyExists(_) => {
                format!("{} already exists. Use /sc or /remove.", escape(host))
            }
            other => escape(&other.to_string()),
        }]
    })?;
    state.supervisor.start(&target.host).await;
    Ok(vec![format!(
        "Server {} named '{}' added and monitoring started.",
        escape(&target.host),
        escape(&target.name)
    )])
}

async fn remove(state: &AppState, raw: &str) -> Replies {
    let [name] = args(raw)[..] else {
        return Err(usage("/remove <name>"));
    };
    let removed = state
        .supervisor
        .remove(name)
        .await
        .map_err(|e| vec![escape(&e.to_string())])?;
    Ok(vec![format!(
        "Server {} ({}) was removed.",
        escape(&removed.name),
        escape(&removed.host)
    )])
}

async fn set_container(state: &AppState, raw: &str) -> Replies {
    let [name, container] = args(raw)[..] else {
        return Err(usage("/sc <name> <container>"));
    };
    let target = resolve(state, name).await?;
    let updated = state
        .registry
        .set_workload(&target.host, container)
        .await
        .map_err(|e| vec![escape(&e.to_string())])?;
    Ok(vec![format!(
        "Container for {} ({}) set to {}.",
        escape(&updated.name),
        escape(&updated.host),
        escape(container)
    )])
}

async fn status(state: &AppState, raw: &str) -> Replies {
    match args(raw)[..] {
        [] => {
            let targets = state.registry.list().await;
            if targets.is_empty() {
                return Ok(vec!["No servers registered.".to_string()]);
            }
            Ok(join_all(targets.iter().map(|t| replies::status(state, t))).await)
        }
        [name] => {
            let target = resolve(state, name).await?;
            Ok(vec![replies::status(state, &target).await])
        }
        _ => Err(usage("/s [name]")),
    }
}

async fn logs(state: &AppState, raw: &str) -> Replies {
    let (name, workload) = match args(raw)[..] {
        [name] => (name, None),
        [name, workload] => (name, Some(workload)),
        _ => return Err(usage("/logs <name> [container]")),
    };
    let target = resolve(state, name).await?;
    Ok(vec![replies::logs(state, &target, workload).await])
}

async fn settings(state: &AppState, raw: &str) -> Replies {
    match args(raw)[..] {
        [] => Ok(vec![format::all_settings(&state.registry.list().await)]),
        [name] => Ok(vec![format::settings(&resolve(state, name).await?)]),
        _ => Err(usage("/settings [name]")),
    }
}

async fn interval(state: &AppState, raw: &str) -> Replies {
    let [name, seconds] = args(raw)[..] else {
        return Err(usage("/interval <name> <seconds>"));
    };
    let Ok(seconds) = seconds.parse::<u64>() else {
        return Err(usage("/interval <name> <seconds>"));
    };
    let target = resolve(state, name).await?;
    state
        .registry
        .set_interval(&target.host, seconds)
        .await
        .map_err(|e| vec![escape(&e.to_string())])?;
    info!(host = %target.host, seconds, "Interval changed.");
    Ok(vec![format!(
        "Interval for {} set to {seconds} seconds.",
        escape(&target.name)
    )])
}

async fn toggle(state: &AppState, raw: &str, enabled: bool) -> Replies {
    let [name] = args(raw)[..] else {
        return Err(usage(if enabled { "/resume <name>" } else { "/stop <name>" }));
    };
    let target = resolve(state, name).await?;
    state
        .registry
        .set_notifications_enabled(&target.host, enabled)
        .await
        .map_err(|e| vec![escape(&e.to_string())])?;
    let verb = if enabled { "resumed" } else { "paused" };
    Ok(vec![format!(
        "Periodic status reports for {} {verb}.",
        escape(&target.name)
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Supervisor;
    use crate::monitor::tests::{Harness, harness, healthy_host};
    use crate::testing::ScriptedExecutor;
    use std::sync::Arc;

    fn app(h: &Harness) -> AppState {
        AppState::new(Arc::new(Supervisor::new(h.ctx.clone())))
    }

    fn cmd(text: &str) -> Command {
        Command::parse(text, "uptimebot").unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(cmd("/add 10.0.0.5 gpu1"), Command::Add("10.0.0.5 gpu1".to_string()));
        assert_eq!(cmd("/s"), Command::Status(String::new()));
        assert_eq!(cmd("/sc gpu1 trainer"), Command::SetContainer("gpu1 trainer".to_string()));
        assert_eq!(cmd("/help"), Command::Help);
    }

    #[tokio::test]
    async fn test_interval_example() {
        let h = harness(healthy_host());
        let state = app(&h);

        let added = handle(&state, cmd("/add 10.0.0.5 gpu1")).await;
        assert!(added[0].contains("added and monitoring started"));
        assert!(state.supervisor.is_running("10.0.0.5").await);

        let rejected = handle(&state, cmd("/interval gpu1 5")).await;
        assert!(rejected[0].contains("at least 10 seconds"));

        let accepted = handle(&state, cmd("/interval gpu1 30")).await;
        assert_eq!(accepted, vec!["Interval for gpu1 set to 30 seconds."]);

        let settings = handle(&state, cmd("/settings gpu1")).await;
        assert!(settings[0].contains("<b>Interval:</b> 30 seconds"));

        state.supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_add_requires_exactly_two_arguments() {
        let h = harness(healthy_host());
        let state = app(&h);

        for text in ["/add", "/add 10.0.0.5", "/add 10.0.0.5 gpu1 extra"] {
            assert_eq!(handle(&state, cmd(text)).await, vec!["Usage: /add &lt;ip&gt; &lt;name&gt;"]);
        }
        assert!(state.registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_add_and_unknown_names() {
        let h = harness(healthy_host());
        let state = app(&h);
        handle(&state, cmd("/add 10.0.0.5 gpu1")).await;

        let duplicate = handle(&state, cmd("/add 10.0.0.5 other")).await;
        assert_eq!(duplicate, vec!["10.0.0.5 already exists. Use /sc or /remove."]);

        let taken = handle(&state, cmd("/add 10.0.0.6 gpu1")).await;
        assert!(taken[0].contains("already used"));

        for text in ["/remove gpu9", "/s gpu9", "/logs gpu9", "/settings gpu9", "/stop gpu9"] {
            assert_eq!(handle(&state, cmd(text)).await, vec!["No server named 'gpu9' found"]);
        }
        state.supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_stops_monitoring() {
        let h = harness(healthy_host());
        let state = app(&h);
        handle(&state, cmd("/add 10.0.0.5 gpu1")).await;

        let removed = handle(&state, cmd("/remove gpu1")).await;

        assert_eq!(removed, vec!["Server gpu1 (10.0.0.5) was removed."]);
        assert!(!state.supervisor.is_running("10.0.0.5").await);
        assert!(state.registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_logs_default_to_configured_container() {
        let h = harness(healthy_host());
        let state = app(&h);
        state.registry.register("10.0.0.5", "gpu1").await.unwrap();

        let missing = handle(&state, cmd("/logs gpu1")).await;
        assert!(missing[0].starts_with("No container set for gpu1"));

        handle(&state, cmd("/sc gpu1 trainer")).await;
        let logs = handle(&state, cmd("/logs gpu1")).await;
        assert_eq!(logs, vec!["Logs of trainer:\n<pre>step 100 done</pre>"]);
        assert!(h
            .executor
            .commands()
            .contains(&"docker logs --tail 2000 'trainer' 2>&1".to_string()));

        let explicit = handle(&state, cmd("/logs gpu1 redis")).await;
        assert!(explicit[0].starts_with("Logs of redis:"));
    }

    #[tokio::test]
    async fn test_status_of_all_servers_replies_per_server() {
        let h = harness(healthy_host());
        let state = app(&h);
        assert_eq!(handle(&state, cmd("/s")).await, vec!["No servers registered."]);

        state.registry.register("10.0.0.5", "gpu1").await.unwrap();
        state.registry.register("10.0.0.6", "gpu2").await.unwrap();

        let replies = handle(&state, cmd("/s")).await;

        assert_eq!(replies.len(), 2);
        assert!(replies[0].contains("gpu1 (10.0.0.5) is ONLINE"));
        assert!(replies[1].contains("gpu2 (10.0.0.6) is ONLINE"));
        // On-demand status never prunes.
        assert!(!h.executor.commands().iter().any(|c| c.starts_with("df -BG")));
    }

    #[tokio::test]
    async fn test_status_of_unreachable_server() {
        let h = harness(ScriptedExecutor::new().unreachable("Connection timed out"));
        let state = app(&h);
        state.registry.register("10.0.0.5", "gpu1").await.unwrap();

        let replies = handle(&state, cmd("/s gpu1")).await;

        assert_eq!(
            replies,
            vec!["Server gpu1 (10.0.0.5) is OFFLINE! Error: Connection to 10.0.0.5 failed: Connection timed out"]
        );
    }

    #[tokio::test]
    async fn test_stop_and_resume_toggle_reports() {
        let h = harness(healthy_host());
        let state = app(&h);
        state.registry.register("10.0.0.5", "gpu1").await.unwrap();

        assert_eq!(
            handle(&state, cmd("/stop gpu1")).await,
            vec!["Periodic status reports for gpu1 paused."]
        );
        assert!(!state.registry.get("10.0.0.5").await.unwrap().notifications_enabled);

        handle(&state, cmd("/resume gpu1")).await;
        assert!(state.registry.get("10.0.0.5").await.unwrap().notifications_enabled);
    }

    #[tokio::test]
    async fn test_invalid_container_name_is_rejected() {
        let h = harness(healthy_host());
        let state = app(&h);
        state.registry.register("10.0.0.5", "gpu1").await.unwrap();

        let reply = handle(&state, cmd("/sc gpu1 $(reboot)")).await;

        assert_eq!(reply, vec!["'$(reboot)' is not a valid container name"]);
        assert_eq!(state.registry.get("10.0.0.5").await.unwrap().workload, None);
    }
}
