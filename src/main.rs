//! Duel Client
//!
//! Headless player: connects to the configured server, applies for a battle,
//! plays one match with the auto player, then exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use duel::{
    autoplay,
    config::{GAME_CONFIG_FILE, SERVER_CONFIG_FILE, WEAPON_CONFIG_FILE},
    network::{protocol::APPLY_BATTLE_REQ, transport::Transport, SessionConfig},
    DuelClient, GameConfig, NetSession, ServerRegistry, Settings, WeaponCatalog, WsTransport,
    VERSION,
};

/// Control loop period
const FRAME: Duration = Duration::from_millis(100);

/// Seconds between battle applications while unmatched
const APPLY_RETRY_SECS: f64 = 5.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("Duel Client v{}", VERSION);

    let settings = Settings::from_env()?;
    let rules = GameConfig::load_file(settings.config_path(GAME_CONFIG_FILE))
        .context("Failed to load game config")?;
    let registry = ServerRegistry::load_file(settings.config_path(SERVER_CONFIG_FILE))
        .context("Failed to load server config")?;
    let endpoint = registry.endpoint(&settings.environment)?;
    let catalog = WeaponCatalog::load_file(settings.config_path(WEAPON_CONFIG_FILE))
        .context("Failed to load weapon config")?;

    info!("Environment: {} ({})", settings.environment, endpoint.url());
    info!("Weapons: {}, playing weapon {}", catalog.len(), settings.weapon);

    let session = NetSession::new(WsTransport::new(Handle::current()), SessionConfig::from(endpoint));
    let mut client = DuelClient::new(session, Arc::new(catalog), rules);

    let finished = Arc::new(AtomicBool::new(false));
    client.on_phase_changed(|from, to| info!("Phase {} -> {}", from, to));
    client.on_hit_points_changed(|role, old, new| info!("Role {} hit points {} -> {}", role, old, new));
    {
        let finished = finished.clone();
        client.on_match_ended(move |winner| {
            match winner {
                Some(role) => info!("Match ended, winner: role {}", role),
                None => info!("Match ended without a winner"),
            }
            finished.store(true, Ordering::SeqCst);
        });
    }

    client.connect();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(FRAME);
    let mut last = Instant::now();
    let mut apply_cooldown = 0.0;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                break;
            }
        }

        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;

        client.tick(dt);
        if finished.load(Ordering::SeqCst) {
            break;
        }

        apply_cooldown -= dt;
        if apply_cooldown <= 0.0 && ready_to_apply(&client) {
            apply_cooldown = APPLY_RETRY_SECS;
            if let Err(e) = client.apply_battle(settings.weapon) {
                warn!("Battle application failed: {}", e);
            }
        }

        if let Err(e) = autoplay::play_round(&mut client) {
            warn!("Round command failed: {}", e);
        }
    }

    client.close();
    Ok(())
}

/// Connected, unmatched, and not already waiting on an application.
fn ready_to_apply<T: Transport>(client: &DuelClient<T>) -> bool {
    client.session().is_open()
        && client.role_id().is_none()
        && client.active_match().is_none()
        && !client.session().slots().is_in_flight(APPLY_BATTLE_REQ)
}
