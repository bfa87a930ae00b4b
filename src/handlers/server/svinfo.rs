use crate::handlers::core::traits::PreRegHandler;
use crate::handlers::{Context, HandlerError, HandlerResult};
use crate::state::UnregisteredState;
use async_trait::async_trait;
use slirc_proto::{Command, Message, MessageRef, Prefix};
use std::sync::Arc;
use tracing::{info, warn};

/// Minimum accepted TS protocol version. Peers below this don't speak
/// timestamp-ordered SJOIN/resv semantics and can't be trusted to resolve
/// collisions the same way we do.
const MIN_TS_VERSION: u32 = 3;

/// Clock skew past which we warn an operator but keep the link up.
const TS_WARN_DELTA: i64 = 15;

/// Clock skew past which the link is no longer safe to run; tear it down.
const TS_FATAL_DELTA: i64 = 120;

pub struct SvinfoHandler;

#[async_trait]
impl PreRegHandler for SvinfoHandler {
    async fn handle(
        &self,
        ctx: &mut Context<'_, UnregisteredState>,
        msg: &MessageRef<'_>,
    ) -> HandlerResult {
        // SVINFO <ts6_ver> <min_ver> 0 :<current_time>
        let v: u32 = msg
            .arg(0)
            .and_then(|s| s.parse().ok())
            .ok_or(HandlerError::NeedMoreParams)?;
        let m: u32 = msg
            .arg(1)
            .and_then(|s| s.parse().ok())
            .ok_or(HandlerError::NeedMoreParams)?;
        let z: u32 = msg
            .arg(2)
            .and_then(|s| s.parse().ok())
            .ok_or(HandlerError::NeedMoreParams)?;
        let their_ts: i64 = msg
            .arg(3)
            .and_then(|s| s.parse().ok())
            .ok_or(HandlerError::NeedMoreParams)?;

        info!(v, m, z, their_ts, "Received SVINFO");

        if v < MIN_TS_VERSION {
            warn!(v, min = MIN_TS_VERSION, "peer TS version too old, rejecting link");
            return Err(HandlerError::AccessDenied);
        }

        let now = chrono::Utc::now().timestamp();
        let delta = (now - their_ts).abs();

        if delta >= TS_FATAL_DELTA {
            warn!(delta, "peer clock skew exceeds fatal threshold, closing link");
            return Err(HandlerError::AccessDenied);
        }

        if delta >= TS_WARN_DELTA {
            warn!(delta, "peer clock skew exceeds warning threshold");
            self.notify_opers(ctx, delta).await;
        }

        ctx.state.server_svinfo = Some((v, m, z, their_ts));

        Ok(())
    }
}

impl SvinfoHandler {
    /// Send a server notice to local operators about a skewed peer link.
    async fn notify_opers(&self, ctx: &Context<'_, UnregisteredState>, delta: i64) {
        let text = format!(
            "Warning: excessive TS delta ({delta}s) from linking server at {}",
            ctx.remote_addr
        );
        let notice = Arc::new(Message {
            tags: None,
            prefix: Some(Prefix::ServerName(ctx.matrix.server_info.name.clone())),
            command: Command::NOTICE("*".to_string(), text),
        });

        for user_entry in ctx.matrix.user_manager.users.iter() {
            let user = user_entry.read().await;
            if !user.modes.oper {
                continue;
            }
            if let Some(sessions) = ctx.matrix.user_manager.senders.get(&user.uid) {
                for session in sessions.value() {
                    let _ = session.tx.send(notice.clone()).await;
                }
            }
        }
    }
}
