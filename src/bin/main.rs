//! Vaultframe CLI
//!
//! Demo run (host page + wallet frame in one process, dev collaborators):
//!   vaultframe demo [--email <addr>] [--policy fifo|reject-if-busy]
//!
//! Shard store (file-backed, under $VAULTFRAME_ROOT/<app>/):
//!   vaultframe vault put <id> <json> [--type <type>]
//!   vaultframe vault get <id>
//!   vaultframe vault list [--type <type>]
//!   vaultframe vault delete <id>
//!   vaultframe vault export
//!   vaultframe vault import <file>
//!
//! Key splitting:
//!   vaultframe split-key <hex>
//!
//! Output format:
//!   --json     Output raw JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use serde_json::{json, Value};
use std::env;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use tracing::{debug, info};

use vaultframe::core::methods::{events, rpc, wallet};
use vaultframe::dev::{self, DEV_OTP_CODE};
use vaultframe::logging::init_logging;
use vaultframe::wallet::{combine_shards, split_key, ApprovalEvent};
use vaultframe::{
    ApprovalPolicy, AuthMethod, BridgeConfig, HostBridge, LocalFrameHost, ShardStore, Storage, WalletConfig, WalletCore,
};

const DEFAULT_TYPE: &str = "secret";

fn main() {
    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);
    init_logging(opts.debug);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("vaultframe {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("demo") => cmd_demo(&opts),
        Some("vault") => cmd_vault(&opts),
        Some("split-key") => cmd_split_key(&opts),
        Some(cmd) => Err(format!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = !opts.json && (opts.pretty || io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({ "error": e }), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    args: Vec<String>,
    app: Option<String>,
    password: Option<String>,
    record_type: Option<String>,
    email: Option<String>,
    policy: Option<String>,
    wallet_url: Option<String>,
    debug: bool,
    // Output options
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let value = args.get(i + 1).cloned();
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--debug" => opts.debug = true,
                "--app" | "-a" | "--password" | "-p" | "--type" | "-t" | "--email" | "--policy" | "--wallet-url" => {
                    let slot = match arg.as_str() {
                        "--app" | "-a" => &mut opts.app,
                        "--password" | "-p" => &mut opts.password,
                        "--type" | "-t" => &mut opts.record_type,
                        "--email" => &mut opts.email,
                        "--policy" => &mut opts.policy,
                        _ => &mut opts.wallet_url,
                    };
                    if value.is_some() {
                        *slot = value;
                        i += 1;
                    }
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        // First positional is command
        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        opts.args = positional;

        // Environment variables (lower priority than CLI args)
        if opts.app.is_none() {
            opts.app = env::var("VAULTFRAME_APP").ok().filter(|s| !s.is_empty());
        }
        if opts.password.is_none() {
            opts.password = env::var("VAULTFRAME_PASSWORD").ok().filter(|s| !s.is_empty());
        }
        if opts.wallet_url.is_none() {
            opts.wallet_url = env::var("VAULTFRAME_WALLET_URL").ok().filter(|s| !s.is_empty());
        }
        if !opts.debug {
            opts.debug = env::var("VAULTFRAME_DEBUG").map(|v| v == "1").unwrap_or(false);
        }

        opts
    }

    fn app(&self) -> String {
        self.app.clone().unwrap_or_else(|| "vaultframe".to_string())
    }

    fn arg(&self, index: usize, name: &str) -> Result<&str, String> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| format!("Missing argument: <{}>", name))
    }
}

fn print_usage() {
    println!(
        r#"vaultframe - embedded wallet bridge and shard store

USAGE:
    vaultframe <command> [args] [options]

COMMANDS:
    demo                    Run host page and wallet frame in-process
    vault put <id> <json>   Encrypt and store a record
    vault get <id>          Decrypt a record
    vault list              List record ids of a type
    vault delete <id>       Delete a record
    vault export            Print the encrypted export bundle
    vault import <file>     Replace the store with an export bundle
    split-key <hex>         Split a key into device/server shards

DEMO OPTIONS:
    --email <addr>          Login email (default: demo@vaultframe.dev)
    --policy <policy>       Approval policy: fifo|reject-if-busy
    --wallet-url <url>      Wallet frame URL (env: VAULTFRAME_WALLET_URL)
    --debug                 Log dropped bridge messages (env: VAULTFRAME_DEBUG)

VAULT OPTIONS:
    --app, -a <name>        Application name (env: VAULTFRAME_APP)
    --password, -p <pw>     Store password (env: VAULTFRAME_PASSWORD, else prompt)
    --type, -t <type>       Record type (default: secret)

OUTPUT OPTIONS:
    --json                  Raw JSON output
    --pretty                Pretty-print JSON
    --version, -V           Print version

ENVIRONMENT:
    VAULTFRAME_ROOT         Storage root (default: platform data dir)
    VAULTFRAME_LOG_JSON=1   JSON log lines on stderr
    RUST_LOG                Log filter (default: info)

EXAMPLES:
    vaultframe demo --pretty
    vaultframe vault put api-key '{{"token":"abc"}}' -p hunter2
    vaultframe vault get api-key -p hunter2
    vaultframe split-key 0x$(openssl rand -hex 32)
"#
    );
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))
}

fn cmd_demo(opts: &ParsedArgs) -> Result<Value, String> {
    runtime()?.block_on(run_demo(opts))
}

async fn run_demo(opts: &ParsedArgs) -> Result<Value, String> {
    let host_origin = "https://shop.vaultframe.dev";
    let wallet_url = opts
        .wallet_url
        .clone()
        .unwrap_or_else(|| "https://wallet.vaultframe.dev/embed".to_string());
    let email = opts.email.clone().unwrap_or_else(|| "demo@vaultframe.dev".to_string());

    let mut wallet_config = WalletConfig::from_env(&opts.app()).with_allowed_origins(vec![host_origin.to_string()]);
    if let Some(policy) = opts.policy.as_deref() {
        let policy = ApprovalPolicy::from_str(policy).ok_or_else(|| format!("Unknown approval policy: {}", policy))?;
        wallet_config = wallet_config.with_approval_policy(policy);
    }
    let core = WalletCore::new(wallet_config.clone(), dev::collaborators(&wallet_config), Storage::in_memory());

    // Stand-in for the approval UI: approve everything as it is queued.
    let mut approvals = core.approvals().subscribe();
    let approver = core.clone();
    tokio::spawn(async move {
        while let Ok(event) = approvals.recv().await {
            if let ApprovalEvent::Queued(pending) = event {
                info!(id = %pending.id, to = %pending.tx.to, "auto-approving transaction");
                approver.approvals().approve(&pending.id);
            }
        }
    });

    let frames = Arc::new(LocalFrameHost::new(host_origin, core.clone()));
    let bridge = HostBridge::new(BridgeConfig::new(wallet_url).with_debug(opts.debug), frames)
        .map_err(|e| e.to_string())?;
    for event in [events::AUTHENTICATED, events::CONNECT, events::ACCOUNTS_CHANGED, events::LOCKED] {
        bridge.on(event, move |data| debug!(event, %data, "wallet event"));
    }

    bridge.initialize().await.map_err(|e| e.to_string())?;
    let otp_sent = bridge
        .authenticate(AuthMethod::Email { credential: email.clone() })
        .await
        .map_err(|e| e.to_string())?;
    bridge.verify_otp(DEV_OTP_CODE).await.map_err(|e| e.to_string())?;

    let enrolled = bridge.request(wallet::ENROLL, json!([])).await.map_err(|e| e.to_string())?;
    let accounts = bridge.connect(None).await.map_err(|e| e.to_string())?;
    let address = accounts.first().cloned().ok_or("Wallet returned no accounts")?;

    let signature = bridge
        .request(rpc::PERSONAL_SIGN, json!(["0x68656c6c6f", address]))
        .await
        .map_err(|e| e.to_string())?;
    let tx_hash = bridge
        .request(
            rpc::SEND_TRANSACTION,
            json!([{ "to": "0x000000000000000000000000000000000000dead", "value": "0x1" }]),
        )
        .await
        .map_err(|e| e.to_string())?;
    let latency = bridge.ping().await.map_err(|e| e.to_string())?;
    let state = bridge.state();

    let locked = bridge.request(wallet::LOCK, json!([])).await.map_err(|e| e.to_string())?;
    bridge.destroy();

    Ok(json!({
        "email": email,
        "otpSent": otp_sent,
        "enrolled": enrolled,
        "accounts": accounts,
        "signature": signature,
        "txHash": tx_hash,
        "pingMs": latency.as_secs_f64() * 1000.0,
        "state": state,
        "locked": locked,
    }))
}

fn read_password(opts: &ParsedArgs) -> Result<String, String> {
    if let Some(password) = opts.password.clone() {
        return Ok(password);
    }
    print!("Store password: ");
    io::stdout().flush().ok();
    let mut password = String::new();
    io::stdin()
        .read_line(&mut password)
        .map_err(|e| format!("Password read failed: {}", e))?;
    let password = password.trim().to_string();
    if password.is_empty() {
        return Err("Password cannot be empty".into());
    }
    Ok(password)
}

fn cmd_vault(opts: &ParsedArgs) -> Result<Value, String> {
    let action = opts.arg(0, "action")?.to_string();
    let password = read_password(opts)?;
    let app = opts.app();
    let record_type = opts.record_type.clone().unwrap_or_else(|| DEFAULT_TYPE.to_string());

    runtime()?.block_on(async {
        let mut store = ShardStore::for_app(&app);
        store.initialize(&password).await.map_err(|e| e.to_string())?;

        let output = match action.as_str() {
            "put" => {
                let id = opts.arg(1, "id")?;
                let raw = opts.arg(2, "json")?;
                let value: Value = serde_json::from_str(raw).map_err(|e| format!("Invalid JSON: {}", e))?;
                let record = store.store(id, &value, &record_type).await.map_err(|e| e.to_string())?;
                json!({ "id": record.id, "type": record.type_, "timestamp": record.timestamp })
            }
            "get" => {
                let id = opts.arg(1, "id")?;
                let value: Option<Value> = store.retrieve(id).await.map_err(|e| e.to_string())?;
                json!({ "id": id, "data": value })
            }
            "list" | "ls" => {
                let ids = store.keys_by_type(&record_type).await.map_err(|e| e.to_string())?;
                json!({ "type": record_type, "ids": ids })
            }
            "delete" | "rm" => {
                let id = opts.arg(1, "id")?;
                let deleted = store.delete(id).await.map_err(|e| e.to_string())?;
                json!({ "id": id, "deleted": deleted })
            }
            "export" => {
                let bundle = store.export_encrypted().await.map_err(|e| e.to_string())?;
                serde_json::from_str(&bundle).map_err(|e| format!("Export failed: {}", e))?
            }
            "import" => {
                let path = opts.arg(1, "file")?;
                let bundle = std::fs::read_to_string(path).map_err(|e| format!("Read {} failed: {}", path, e))?;
                let imported = store.import_encrypted(&bundle).await.map_err(|e| e.to_string())?;
                json!({ "imported": imported, "locked": !store.is_initialized() })
            }
            other => return Err(format!("Unknown vault action: {}", other)),
        };
        store.close().await.map_err(|e| e.to_string())?;
        Ok::<Value, String>(output)
    })
}

fn cmd_split_key(opts: &ParsedArgs) -> Result<Value, String> {
    let raw = opts.arg(0, "hex")?;
    let key = hex::decode(raw.trim_start_matches("0x")).map_err(|e| format!("Invalid hex: {}", e))?;
    if key.is_empty() {
        return Err("Key cannot be empty".into());
    }
    let (device, server) = split_key(&key);
    let restored = combine_shards(&device, &server).map_err(|e| e.to_string())?;
    Ok(json!({
        "device": hex::encode(&*device),
        "server": hex::encode(&*server),
        "roundTrip": *restored == key,
    }))
}
