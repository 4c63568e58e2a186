use std::sync::Arc;

use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use urbanshield_portal::alerts::LogNotifier;
use urbanshield_portal::auth::SessionEvent;
use urbanshield_portal::config::Config;
use urbanshield_portal::location::{LocationFeed, LocationSource};
use urbanshield_portal::PortalContext;

/// Headless agent: keeps the session alive, reports presence and raises
/// proximity alerts for positions read from stdin, one `lat,lon[,accuracy]`
/// per line.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let context = PortalContext::from_config(config)
        .await
        .expect("failed to initialise portal context");

    if !context.tokens.is_authenticated() {
        match context.config.credentials() {
            Some((username, password)) => match context.auth.login(username, password).await {
                Ok(user) => tracing::info!(username = %user.username, admin = user.is_admin, "logged in"),
                Err(err) => {
                    tracing::error!(%err, "login failed");
                    return;
                }
            },
            None => tracing::warn!("no stored session and no credentials configured"),
        }
    }

    let feed = LocationFeed::new();
    let source: Arc<dyn LocationSource> = Arc::new(feed.clone());
    let beacon = context.beacon(source.clone());
    let engine = context.proximity_engine(source, Arc::new(LogNotifier::new(context.config.notifications)));
    beacon.start(context.config.track_location);
    engine.start(context.config.proximity_alerts, context.config.alert_radius_km);

    let mut alerts = context.alerts.subscribe();
    let mut session = context.tokens.subscribe();
    let mut pump = tokio::spawn(async move { feed.pump(BufReader::new(tokio::io::stdin())).await });
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            alert = alerts.recv() => match alert {
                Ok(alert) => tracing::warn!(
                    id = %alert.id,
                    severity = ?alert.severity,
                    title = %alert.title,
                    body = %alert.body,
                    "proximity alert"
                ),
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "alert receiver lagged"),
                Err(RecvError::Closed) => break,
            },
            event = session.recv() => match event {
                Ok(SessionEvent::Expired) => {
                    tracing::warn!("session expired, log in again");
                    break;
                }
                Ok(SessionEvent::LoggedOut) => break,
                Ok(SessionEvent::LoggedIn { username }) => tracing::info!(%username, "session started"),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            finished = &mut pump => {
                match finished {
                    Ok(Ok(())) => tracing::info!("location feed closed"),
                    Ok(Err(err)) => tracing::error!(%err, "failed to read location feed"),
                    Err(err) => tracing::error!(%err, "location feed task failed"),
                }
                break;
            }
            _ = &mut shutdown => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    beacon.stop();
    engine.stop();
    pump.abort();
}
