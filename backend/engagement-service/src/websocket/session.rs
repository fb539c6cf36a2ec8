use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::Receiver;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use super::{Notifier, SubscriberId, Subscription};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// WebSocket actor for one viewer of one story.
///
/// The connection is receive-only: engagement payloads queued by the notifier
/// are forwarded as text frames, client text is ignored.
pub struct StorySession {
    story_id: Uuid,
    subscriber_id: SubscriberId,
    receiver: Option<Receiver<Arc<str>>>,
    notifier: Notifier,
    hb: Instant,
}

impl StorySession {
    pub fn new(subscription: Subscription, notifier: Notifier) -> Self {
        Self {
            story_id: subscription.story_id,
            subscriber_id: subscription.id,
            receiver: Some(subscription.receiver),
            notifier,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(story_id = %act.story_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for StorySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(story_id = %self.story_id, "WebSocket session started");

        self.hb(ctx);

        if let Some(rx) = self.receiver.take() {
            ctx.add_stream(ReceiverStream::new(rx));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(story_id = %self.story_id, "WebSocket session stopped");

        let notifier = self.notifier.clone();
        let story_id = self.story_id;
        let subscriber_id = self.subscriber_id;

        actix::spawn(async move {
            notifier.unsubscribe(story_id, subscriber_id).await;
        });
    }
}

// Payloads from the notifier queue
impl StreamHandler<Arc<str>> for StorySession {
    fn handle(&mut self, payload: Arc<str>, ctx: &mut Self::Context) {
        ctx.text(payload.as_ref());
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        tracing::debug!(story_id = %self.story_id, "Notifier queue closed");
        ctx.close(None);
        ctx.stop();
    }
}

// WebSocket protocol messages
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for StorySession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {
                tracing::debug!(story_id = %self.story_id, "Ignoring client frame");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!("WebSocket close message received: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}
