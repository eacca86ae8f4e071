//! Terminal bridge HTTP server with a small xterm.js page.
//!
//! Run with:
//!   cargo run -p termbridge-server -- --workspaces ./ws --user 1:ada=secret
//!
//! Then open http://localhost:3000 in your browser.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::{Router, response::Html, routing::get};
use clap::Parser;
use termbridge_core::{
    BridgeConfig, DirectoryWorkspaces, DisconnectPolicy, NoWorkspaces, StaticTokenAuthenticator,
    User, WorkspaceResolver,
};
use termbridge_session::{SessionManager, storage::MemorySessionStore};
use termbridge_transport::http::{AppState, router_with};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "termbridge-server", about = "Run shell commands over HTTP")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "TERMBRIDGE_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
    /// Base directory holding `<user id>/<project id>` workspaces.
    #[arg(long, env = "TERMBRIDGE_WORKSPACES")]
    workspaces: Option<PathBuf>,
    /// Accepted credentials as `ID[:NAME]=TOKEN`; repeatable.
    #[arg(long = "user", value_name = "ID[:NAME]=TOKEN", value_parser = parse_user, required = true)]
    users: Vec<(String, User)>,
    /// TOML file with bridge settings; flags below override it.
    #[arg(long, env = "TERMBRIDGE_CONFIG")]
    config: Option<PathBuf>,
    /// Seconds a session may sit idle before it is dropped.
    #[arg(long)]
    session_ttl: Option<u64>,
    /// Seconds of silence before a heartbeat line is sent.
    #[arg(long)]
    heartbeat: Option<u64>,
    /// What happens to a running command when its client goes away.
    #[arg(long, value_parser = parse_policy)]
    on_disconnect: Option<DisconnectPolicy>,
    /// Extra toolchain directory to put on PATH; repeatable.
    #[arg(long = "search-path")]
    search_paths: Vec<PathBuf>,
}

impl Args {
    fn bridge_config(&self) -> anyhow::Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => BridgeConfig::default(),
        };
        if let Some(ttl) = self.session_ttl {
            config.session_ttl_secs = ttl;
        }
        if let Some(secs) = self.heartbeat {
            config.heartbeat_secs = secs;
        }
        if let Some(policy) = self.on_disconnect {
            config.on_disconnect = policy;
        }
        config
            .extra_search_paths
            .extend(self.search_paths.iter().cloned());
        Ok(config)
    }
}

fn parse_user(raw: &str) -> Result<(String, User), String> {
    let (who, token) = raw
        .split_once('=')
        .ok_or_else(|| "expected ID[:NAME]=TOKEN".to_string())?;
    let (id, name) = who.split_once(':').unwrap_or((who, who));
    if id.is_empty() || token.is_empty() {
        return Err("user id and token must not be empty".to_string());
    }
    Ok((token.to_string(), User::new(id, name)))
}

fn parse_policy(raw: &str) -> Result<DisconnectPolicy, String> {
    match raw {
        "kill" => Ok(DisconnectPolicy::Kill),
        "detach" => Ok(DisconnectPolicy::Detach),
        other => Err(format!("unknown policy '{other}', expected kill or detach")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.bridge_config()?;

    let workspaces: Arc<dyn WorkspaceResolver> = match &args.workspaces {
        Some(base) => {
            tracing::info!(base = %base.display(), "Serving project workspaces");
            Arc::new(DirectoryWorkspaces::new(base))
        }
        None => Arc::new(NoWorkspaces),
    };
    let auth = args
        .users
        .iter()
        .cloned()
        .fold(StaticTokenAuthenticator::new(), |auth, (token, user)| {
            auth.with_token(token, user)
        });
    tracing::info!(users = auth.len(), "Loaded credentials");

    let manager = Arc::new(
        SessionManager::discover(Arc::new(MemorySessionStore::new()), workspaces, config).await,
    );
    let sweeper = manager.spawn_sweeper();

    let app = router_with(
        AppState::new(Arc::clone(&manager), Arc::new(auth)),
        Router::new().route("/", get(index_handler)),
    );

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    tracing::info!("Server listening on http://{}", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>termbridge</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/xterm@5.3.0/css/xterm.css" />
    <script src="https://cdn.jsdelivr.net/npm/xterm@5.3.0/lib/xterm.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/xterm-addon-fit@0.8.0/lib/xterm-addon-fit.js"></script>
    <style>
        body { margin: 0; padding: 20px; background: #1e1e1e; font-family: system-ui, sans-serif; color: #ccc; }
        h1 { color: #fff; margin-bottom: 10px; }
        #terminal-container { width: 100%; height: calc(100vh - 120px); }
        input { background: #2d2d2d; color: #fff; border: 1px solid #444; padding: 4px; }
    </style>
</head>
<body>
    <h1>termbridge</h1>
    <div>
        Token <input id="token" type="password" />
        Project <input id="project" />
    </div>
    <div id="terminal-container"></div>

    <script>
        const term = new Terminal({
            cursorBlink: true,
            fontSize: 14,
            fontFamily: 'Menlo, Monaco, "Courier New", monospace',
            convertEol: true,
            theme: { background: '#1e1e1e', foreground: '#d4d4d4' }
        });
        const fitAddon = new FitAddon.FitAddon();
        term.loadAddon(fitAddon);
        term.open(document.getElementById('terminal-container'));
        fitAddon.fit();
        window.addEventListener('resize', () => fitAddon.fit());

        let prompt = { cwd: '~', user: '' };
        let line = '';
        let processId = null;
        let running = false;

        const headers = () => ({
            'Content-Type': 'application/json',
            'Authorization': 'Bearer ' + document.getElementById('token').value
        });
        const project = () => document.getElementById('project').value || undefined;
        const showPrompt = () => term.write(`\x1b[32m${prompt.user}:${prompt.cwd}$\x1b[0m `);

        async function exec(command) {
            running = true;
            const res = await fetch('/api/terminal/exec', {
                method: 'POST', headers: headers(),
                body: JSON.stringify({ command, project_id: project() })
            });
            if (!res.ok) {
                const err = await res.json().catch(() => ({ data: res.statusText }));
                term.write(`\x1b[31m${err.data}\x1b[0m\n`);
            } else {
                const reader = res.body.getReader();
                const decoder = new TextDecoder();
                let buffer = '';
                for (;;) {
                    const { value, done } = await reader.read();
                    if (done) break;
                    buffer += decoder.decode(value, { stream: true });
                    let nl;
                    while ((nl = buffer.indexOf('\n')) >= 0) {
                        const raw = buffer.slice(0, nl).trim();
                        buffer = buffer.slice(nl + 1);
                        if (!raw) continue;
                        const msg = JSON.parse(raw);
                        if (msg.type === 'output') term.write(msg.data);
                        else if (msg.type === 'error') term.write(`\x1b[31m${msg.data}\x1b[0m\n`);
                        else if (msg.type === 'meta' && msg.process_id) processId = msg.process_id;
                        else if (msg.type === 'meta') prompt = { cwd: msg.cwd, user: msg.user };
                    }
                }
            }
            running = false;
            processId = null;
            showPrompt();
        }

        function post(path, body) {
            return fetch(path, { method: 'POST', headers: headers(), body: JSON.stringify(body) });
        }

        term.onData((data) => {
            if (data === '\x03') {
                if (running && processId) post('/api/terminal/interrupt', { process_id: processId });
                else { term.write('^C\n'); line = ''; showPrompt(); }
                return;
            }
            if (data === '\r') {
                term.write('\n');
                const input = line;
                line = '';
                if (running) {
                    if (processId) post('/api/terminal/stdin', { process_id: processId, input: input + '\n' });
                } else if (input.trim()) {
                    exec(input);
                } else {
                    showPrompt();
                }
                return;
            }
            if (data === '\x7f') {
                if (line.length > 0) { line = line.slice(0, -1); term.write('\b \b'); }
                return;
            }
            line += data;
            term.write(data);
        });

        showPrompt();
    </script>
</body>
</html>
"#;
