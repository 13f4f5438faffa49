//! lodectl - Lodestone locator record tool
//!
//! Offline key management and locator event handling, plus an
//! end-to-end demo over an in-process relay pool. Network publishing
//! belongs to applications embedding the library together with a
//! socket-backed pool.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use lodestone_client::{PublishOptions, Publisher, ResolveOptions, Resolver, ResolverConfig};
use lodestone_core::event::{build_locator, open_locator, BuildOptions, EncryptMode};
use lodestone_core::{payload, select_endpoints, Event, Keys, Signer};
use lodestone_relay::MemoryPool;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// lodectl - Lodestone locator record tool
#[derive(Parser, Debug)]
#[command(name = "lodectl")]
#[command(about = "Build, inspect, and demo Lodestone locator records")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a fresh identity
    Keygen,

    /// Build and sign a locator event from a payload file
    Build {
        /// Publisher secret key (hex or nsec)
        #[arg(long, env = "LODESTONE_SECRET")]
        secret: String,

        /// Path to the payload JSON, `-` for stdin
        #[arg(long)]
        payload: PathBuf,

        /// Record name (`d` tag)
        #[arg(long, default_value = "addr")]
        identifier: String,

        /// Leave the payload unencrypted
        #[arg(long)]
        public: bool,

        /// Seal for one peer (hex or npub)
        #[arg(long)]
        recipient: Option<String>,

        /// Wrap for several recipients (repeatable; hex or npub)
        #[arg(long = "wrap")]
        wrap_for: Vec<String>,

        /// Mark the locator non-discoverable by non-targets
        #[arg(long)]
        private: bool,

        /// Absolute expiry (Unix seconds)
        #[arg(long)]
        expiration: Option<u64>,
    },

    /// Verify a locator event and, when possible, show its payload
    Inspect {
        /// Path to the event JSON, `-` for stdin
        #[arg(long)]
        event: PathBuf,

        /// Secret key for decryption (hex or nsec)
        #[arg(long, env = "LODESTONE_SECRET")]
        secret: Option<String>,
    },

    /// Publish and resolve through an in-process relay pool
    Demo {
        /// Exercise relay-list discovery across two relays
        #[arg(long)]
        gossip: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("lodectl=info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Keygen => keygen(),
        Command::Build {
            secret,
            payload,
            identifier,
            public,
            recipient,
            wrap_for,
            private,
            expiration,
        } => {
            build(
                &secret, &payload, &identifier, public, recipient, wrap_for, private, expiration,
            )
            .await
        }
        Command::Inspect { event, secret } => inspect(&event, secret.as_deref()).await,
        Command::Demo { gossip } => demo(gossip).await,
    }
}

fn keygen() -> anyhow::Result<()> {
    let keys = Keys::generate();
    println!("public key:  {}", keys.public_key_hex());
    println!("npub:        {}", keys.npub()?);
    println!("nsec:        {}", keys.nsec()?);
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn read_input(path: &PathBuf) -> anyhow::Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))
    }
}

#[allow(clippy::too_many_arguments)]
async fn build(
    secret: &str,
    payload_path: &PathBuf,
    identifier: &str,
    public: bool,
    recipient: Option<String>,
    wrap_for: Vec<String>,
    private: bool,
    expiration: Option<u64>,
) -> anyhow::Result<()> {
    let keys = Keys::parse(secret)?;
    let bytes = read_input(payload_path)?;
    let parsed = payload::decode(&bytes)?;
    let encoded = payload::encode(&parsed)?;

    let mode = if !wrap_for.is_empty() {
        let mut recipients = Vec::new();
        for input in &wrap_for {
            let hex_pk = lodestone_core::normalize_public_key(input)?;
            recipients.push(lodestone_core::keys::parse_public_key(&hex_pk)?);
        }
        EncryptMode::Wrapped(recipients)
    } else if let Some(input) = &recipient {
        let hex_pk = lodestone_core::normalize_public_key(input)?;
        EncryptMode::ToPeer(lodestone_core::keys::parse_public_key(&hex_pk)?)
    } else if public {
        EncryptMode::Plain
    } else {
        EncryptMode::ToSelf
    };

    let event = build_locator(
        &keys,
        &encoded,
        identifier,
        &mode,
        unix_now(),
        &BuildOptions {
            private,
            expiration,
        },
    )
    .await?;

    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}

async fn inspect(event_path: &PathBuf, secret: Option<&str>) -> anyhow::Result<()> {
    let bytes = read_input(event_path)?;
    let event: Event = serde_json::from_slice(&bytes).context("parsing event JSON")?;

    event.verify().context("event failed verification")?;
    println!("id:         {}", event.id);
    println!("author:     {}", event.pubkey);
    println!("kind:       {}", event.kind);
    println!("created_at: {}", event.created_at);
    println!("identifier: {}", event.identifier().unwrap_or("(none)"));
    if let Some(expiration) = event.expiration() {
        println!("expires:    {expiration}");
    }

    let signer: Option<Keys> = secret.map(Keys::parse).transpose()?;
    if signer.is_none() && !event.content.starts_with('{') {
        println!("content:    sealed (pass --secret to decrypt)");
        return Ok(());
    }
    let opened = open_locator(&event, signer.as_ref().map(|k| k as &dyn Signer)).await?;
    let Some(opened) = opened else {
        println!("content:    wrapped for other recipients");
        return Ok(());
    };

    let parsed = payload::decode(&opened)?;
    println!(
        "payload:    v{} ttl={} updated_at={}",
        parsed.v, parsed.ttl, parsed.updated_at
    );
    for endpoint in select_endpoints(&parsed.endpoints) {
        println!(
            "  {:<6} {:<8} priority={:<5} {}",
            endpoint.transport,
            endpoint.family.as_deref().unwrap_or("-"),
            endpoint.priority_or_default(),
            endpoint.url
        );
    }
    Ok(())
}

/// Publish and resolve a locator over an in-process pool, printing the
/// endpoints in connection order.
async fn demo(gossip: bool) -> anyhow::Result<()> {
    use lodestone_core::event::{UnsignedEvent, RELAY_LIST_KIND};
    use lodestone_core::{Endpoint, Payload};

    let pool = Arc::new(MemoryPool::new());
    let bootstrap = vec!["memory://bootstrap".to_string()];
    let wide = vec!["memory://bootstrap".to_string(), "memory://far".to_string()];

    let publisher = Publisher::with_pool(pool.clone());
    let keys = Keys::generate();

    let payload = Payload::new(
        600,
        unix_now(),
        vec![
            Endpoint::new("tcp", "203.0.113.42:9735")
                .with_priority(10)
                .with_family("ipv4"),
            Endpoint::new("tcp", "[2001:db8:abcd:42::10]:9735")
                .with_priority(10)
                .with_family("ipv6"),
            Endpoint::new("tcp", "exampleonionaddr.onion:9735")
                .with_priority(10)
                .with_family("onion"),
        ],
    );

    let publish_relays = if gossip { &wide[1..] } else { &bootstrap[..] };
    publisher
        .publish(publish_relays, &keys, &payload, &PublishOptions::default())
        .await?;

    if gossip {
        // only the advertised relay list lives on the bootstrap relay
        let relay_list = keys
            .sign_event(UnsignedEvent {
                pubkey: keys.public_key_hex(),
                created_at: unix_now(),
                kind: RELAY_LIST_KIND,
                tags: vec![vec!["r".into(), "memory://far".into()]],
                content: String::new(),
            })
            .await?;
        pool.relay("memory://bootstrap")
            .submit(relay_list)
            .map_err(|e| anyhow::anyhow!("relay refused relay list: {e}"))?;
    }

    let config = ResolverConfig::default()
        .with_bootstrap_relays(bootstrap)
        .with_timeout(Duration::from_secs(2));
    let resolver = Resolver::with_pool(config, pool);

    let options = if gossip {
        ResolveOptions::default().gossip()
    } else {
        ResolveOptions::default()
    };
    let resolved = resolver
        .resolve(&keys.public_key_hex(), Some(&keys), "addr", &options)
        .await?;

    let Some(resolved) = resolved else {
        bail!("demo record did not resolve");
    };
    println!("resolved locator for {}:", keys.public_key_hex());
    for endpoint in select_endpoints(&resolved.endpoints) {
        println!(
            "  {:<6} {:<8} priority={:<5} {}",
            endpoint.transport,
            endpoint.family.as_deref().unwrap_or("-"),
            endpoint.priority_or_default(),
            endpoint.url
        );
    }
    Ok(())
}
