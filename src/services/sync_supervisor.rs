use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::gateway::{GatewayResult, RemoteSyncGateway},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep a remote gateway installed and drive the connectivity flag from its health checks.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = GatewayResult<Arc<dyn RemoteSyncGateway>>> + Send,
{
    let poll_interval = state.config().health_poll_interval;
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(gateway) => {
                state.install_gateway(gateway.clone()).await;
                info!("remote store connected");
                delay = INITIAL_DELAY;

                loop {
                    match gateway.health_check().await {
                        Ok(()) => {
                            state.oracle().set_online(true);
                            sleep(poll_interval).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "remote health check failed");
                            state.oracle().set_online(false);
                            if reconnect(gateway.as_ref()).await {
                                state.oracle().set_online(true);
                                sleep(poll_interval).await;
                                continue;
                            }
                            warn!("exhausted remote reconnect attempts; staying offline");
                            break;
                        }
                    }
                }

                state.clear_gateway().await;
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "remote store connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

async fn reconnect(gateway: &dyn RemoteSyncGateway) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match gateway.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "remote reconnection succeeded");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "remote reconnect attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}
