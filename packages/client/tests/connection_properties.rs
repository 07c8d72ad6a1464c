//! The transport is open exactly while `connect()` references are held.

use std::{sync::Arc, time::Duration};

use proptest::prelude::*;

use chatline_client::{ChannelConfig, ConnectionManager, transport::MemoryTransportFactory};

fn config() -> ChannelConfig {
    ChannelConfig {
        user_id: "alice".to_string(),
        ..ChannelConfig::default()
    }
    .without_heartbeat()
}

proptest! {
    #[test]
    fn transport_is_open_iff_references_are_held(
        calls in prop::collection::vec(any::<bool>(), 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let (factory, mut accepted) = MemoryTransportFactory::new();
            let manager = ConnectionManager::spawn(config(), Arc::new(factory.clone()));
            let mut peers = Vec::new();
            let mut references = 0usize;

            for connect in calls {
                if connect {
                    manager.connect().await.unwrap();
                    references += 1;
                } else {
                    // surplus calls are ignored
                    manager.disconnect().await.unwrap();
                    references = references.saturating_sub(1);
                }
                // let a spawned open run to completion
                tokio::time::sleep(Duration::from_millis(1)).await;
                while let Ok(peer) = accepted.try_recv() {
                    peers.push(peer);
                }

                let snapshot = manager.snapshot().await.unwrap();
                prop_assert_eq!(snapshot.ref_count, references);
                prop_assert_eq!(factory.live_count(), usize::from(references > 0));
            }
            Ok(())
        })?;
    }
}
