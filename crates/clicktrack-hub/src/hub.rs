//! Hub actor: owns the coordinator and the set of live connections.
//!
//! Every inbound frame runs to completion here, so the session is mutated in one
//! place and the change is applied before anything is sent.

use std::collections::HashMap;
use std::sync::Arc;

use actix::prelude::*;
use clicktrack_types::{ClientMessage, Clock, ServerMessage};

use crate::coordinator::Coordinator;

/// Outbound frame for one connection.
#[derive(Message, Clone, Debug)]
#[rtype(result = "()")]
pub struct Outbound(pub ServerMessage);

/// Register a connection in the broadcast set.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub id: String,
    pub recipient: Recipient<Outbound>,
}

/// Remove a connection from the broadcast set.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: String,
}

/// A parsed frame received from connection `id`.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Inbound {
    pub id: String,
    pub msg: ClientMessage,
}

pub struct Hub {
    coordinator: Coordinator,
    clock: Arc<dyn Clock>,
    connections: HashMap<String, Recipient<Outbound>>,
}

impl Hub {
    pub fn new(coordinator: Coordinator, clock: Arc<dyn Clock>) -> Self {
        Self {
            coordinator,
            clock,
            connections: HashMap::new(),
        }
    }

    fn broadcast(&self, msg: &ServerMessage) {
        for recipient in self.connections.values() {
            recipient.do_send(Outbound(msg.clone()));
        }
    }
}

impl Actor for Hub {
    type Context = Context<Self>;
}

impl Handler<Connect> for Hub {
    type Result = ();

    fn handle(&mut self, msg: Connect, _ctx: &mut Self::Context) -> Self::Result {
        msg.recipient.do_send(Outbound(ServerMessage::Hello {
            connection_id: msg.id.clone(),
        }));
        self.connections.insert(msg.id.clone(), msg.recipient);
        tracing::info!(
            connection_id = %msg.id,
            connections = self.connections.len(),
            "device connected"
        );
    }
}

impl Handler<Disconnect> for Hub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Self::Context) -> Self::Result {
        if self.connections.remove(&msg.id).is_some() {
            tracing::info!(
                connection_id = %msg.id,
                connections = self.connections.len(),
                "device disconnected"
            );
        }
    }
}

impl Handler<Inbound> for Hub {
    type Result = ();

    fn handle(&mut self, msg: Inbound, _ctx: &mut Self::Context) -> Self::Result {
        let now = self.clock.now_ms();
        tracing::debug!(connection_id = %msg.id, msg = ?msg.msg, "inbound");
        let dispatch = self.coordinator.dispatch(msg.msg, now);
        if let Some(reply) = dispatch.reply {
            match self.connections.get(&msg.id) {
                Some(recipient) => recipient.do_send(Outbound(reply)),
                None => tracing::debug!(connection_id = %msg.id, "reply for unknown connection"),
            }
        }
        if let Some(broadcast) = dispatch.broadcast {
            self.broadcast(&broadcast);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clicktrack_types::{ManualClock, PlaybackSession, TrackSummary};

    use crate::catalog::TrackCatalog;

    struct OneTrack;

    impl TrackCatalog for OneTrack {
        fn list_tracks(&self) -> anyhow::Result<Vec<TrackSummary>> {
            Ok(vec![TrackSummary {
                id: "trackA".into(),
                title: "trackA".into(),
                url: "/audio/trackA.mp3".into(),
                duration_ms: Some(100_000),
            }])
        }
    }

    #[derive(Default)]
    struct Collector {
        seen: Vec<ServerMessage>,
    }

    impl Actor for Collector {
        type Context = Context<Self>;
    }

    impl Handler<Outbound> for Collector {
        type Result = ();

        fn handle(&mut self, msg: Outbound, _ctx: &mut Self::Context) -> Self::Result {
            self.seen.push(msg.0);
        }
    }

    #[derive(Message)]
    #[rtype(result = "Vec<ServerMessage>")]
    struct Drain;

    #[derive(Message)]
    #[rtype(result = "usize")]
    struct ConnectionCount;

    impl Handler<ConnectionCount> for Hub {
        type Result = usize;

        fn handle(&mut self, _msg: ConnectionCount, _ctx: &mut Self::Context) -> Self::Result {
            self.connections.len()
        }
    }

    impl Handler<Drain> for Collector {
        type Result = MessageResult<Drain>;

        fn handle(&mut self, _msg: Drain, _ctx: &mut Self::Context) -> Self::Result {
            MessageResult(std::mem::take(&mut self.seen))
        }
    }

    fn start_hub(clock: Arc<ManualClock>) -> Addr<Hub> {
        Hub::new(Coordinator::new(Arc::new(OneTrack), 2000), clock).start()
    }

    async fn connect(hub: &Addr<Hub>, id: &str) -> Addr<Collector> {
        let collector = Collector::default().start();
        hub.send(Connect {
            id: id.to_string(),
            recipient: collector.clone().recipient(),
        })
        .await
        .unwrap();
        collector
    }

    #[actix_web::test]
    async fn connect_sends_hello() {
        let hub = start_hub(Arc::new(ManualClock::new(0)));
        let a = connect(&hub, "a").await;
        let seen = a.send(Drain).await.unwrap();
        assert_eq!(
            seen,
            vec![ServerMessage::Hello {
                connection_id: "a".into()
            }]
        );
        assert_eq!(hub.send(ConnectionCount).await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn play_replies_to_issuer_and_broadcasts_to_all() {
        let hub = start_hub(Arc::new(ManualClock::new(1000)));
        let operator = connect(&hub, "op").await;
        let device = connect(&hub, "dev").await;
        operator.send(Drain).await.unwrap();
        device.send(Drain).await.unwrap();

        hub.send(Inbound {
            id: "op".into(),
            msg: ClientMessage::Play {
                request_id: 1,
                track_id: "trackA".into(),
            },
        })
        .await
        .unwrap();

        let broadcast = ServerMessage::Play {
            track_id: "trackA".into(),
            start_at: 3000,
        };
        let op_seen = operator.send(Drain).await.unwrap();
        assert_eq!(op_seen.len(), 2);
        assert!(op_seen.contains(&broadcast));
        assert!(op_seen.contains(&ServerMessage::PlayAccepted {
            request_id: 1,
            track_id: "trackA".into(),
            start_at: 3000,
        }));
        assert_eq!(device.send(Drain).await.unwrap(), vec![broadcast]);
    }

    #[actix_web::test]
    async fn rejected_play_is_not_broadcast() {
        let hub = start_hub(Arc::new(ManualClock::new(0)));
        let operator = connect(&hub, "op").await;
        let device = connect(&hub, "dev").await;
        device.send(Drain).await.unwrap();
        operator.send(Drain).await.unwrap();

        hub.send(Inbound {
            id: "op".into(),
            msg: ClientMessage::Play {
                request_id: 9,
                track_id: "nope".into(),
            },
        })
        .await
        .unwrap();

        assert_eq!(
            operator.send(Drain).await.unwrap(),
            vec![ServerMessage::PlayRejected {
                request_id: 9,
                error: "Unknown track.".into(),
            }]
        );
        assert!(device.send(Drain).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn reconnecting_device_resyncs_into_live_session() {
        let clock = Arc::new(ManualClock::new(1000));
        let hub = start_hub(clock.clone());
        let operator = connect(&hub, "op").await;
        hub.send(Inbound {
            id: "op".into(),
            msg: ClientMessage::Play {
                request_id: 1,
                track_id: "trackA".into(),
            },
        })
        .await
        .unwrap();
        operator.send(Drain).await.unwrap();

        clock.set(5000);
        let late = connect(&hub, "late").await;
        hub.send(Inbound {
            id: "late".into(),
            msg: ClientMessage::Resync { request_id: 2 },
        })
        .await
        .unwrap();
        let seen = late.send(Drain).await.unwrap();
        assert_eq!(
            seen.last(),
            Some(&ServerMessage::ResyncReply {
                request_id: 2,
                coordinator_now: 5000,
                session: Some(PlaybackSession::new("trackA", 3000)),
            })
        );
    }

    #[actix_web::test]
    async fn disconnected_connections_stop_receiving() {
        let hub = start_hub(Arc::new(ManualClock::new(0)));
        let a = connect(&hub, "a").await;
        let b = connect(&hub, "b").await;
        a.send(Drain).await.unwrap();
        b.send(Drain).await.unwrap();
        hub.send(Disconnect { id: "b".into() }).await.unwrap();

        hub.send(Inbound {
            id: "a".into(),
            msg: ClientMessage::Stop,
        })
        .await
        .unwrap();

        assert_eq!(a.send(Drain).await.unwrap(), vec![ServerMessage::Stop]);
        assert!(b.send(Drain).await.unwrap().is_empty());
        assert_eq!(hub.send(ConnectionCount).await.unwrap(), 1);
    }
}
