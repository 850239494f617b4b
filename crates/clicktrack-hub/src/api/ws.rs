//! Device and operator websocket sessions.

use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{Error, HttpRequest, HttpResponse, get, web};
use actix_web_actors::ws;
use clicktrack_types::ClientMessage;

use crate::hub::{Connect, Disconnect, Hub, Inbound, Outbound};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(45);

pub struct DeviceWs {
    id: String,
    hub: Addr<Hub>,
    last_seen: Instant,
}

impl DeviceWs {
    pub fn new(hub: Addr<Hub>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            hub,
            last_seen: Instant::now(),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_seen) > CLIENT_TIMEOUT {
                tracing::info!(connection_id = %act.id, "heartbeat timed out; dropping");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.hub.do_send(Inbound {
                id: self.id.clone(),
                msg,
            }),
            Err(err) => {
                tracing::warn!(connection_id = %self.id, error = %err, "ignoring malformed frame");
            }
        }
    }
}

impl Actor for DeviceWs {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
        self.hub.do_send(Connect {
            id: self.id.clone(),
            recipient: ctx.address().recipient::<Outbound>(),
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.hub.do_send(Disconnect {
            id: self.id.clone(),
        });
    }
}

impl Handler<Outbound> for DeviceWs {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) -> Self::Result {
        match serde_json::to_string(&msg.0) {
            Ok(text) => ctx.text(text),
            Err(err) => tracing::warn!(connection_id = %self.id, error = %err, "encode frame failed"),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for DeviceWs {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match item {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!(connection_id = %self.id, error = %err, "protocol error");
                ctx.stop();
                return;
            }
        };
        self.last_seen = Instant::now();
        match msg {
            ws::Message::Text(text) => self.handle_text(&text),
            ws::Message::Ping(bytes) => ctx.pong(&bytes),
            ws::Message::Pong(_) => {}
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Binary(_) => {
                tracing::warn!(connection_id = %self.id, "ignoring binary frame");
            }
            ws::Message::Continuation(_) => ctx.stop(),
            ws::Message::Nop => {}
        }
    }
}

#[get("/ws")]
pub async fn device_ws(
    req: HttpRequest,
    stream: web::Payload,
    hub: web::Data<Addr<Hub>>,
) -> Result<HttpResponse, Error> {
    ws::start(DeviceWs::new(hub.get_ref().clone()), &req, stream)
}
