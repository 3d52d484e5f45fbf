//! Several gateway processes sharing one cache
//!
//! Each gateway gets its own `NetworkServer` over the same store, the way
//! separate processes would share one Redis instance.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lib_coordinator::{
    CoordinatorConfig, DeviceClass, DeviceRecord, DeviceSession, DownlinkDecision, DownlinkSender,
    InMemoryDeviceRegistry, NetworkServer, PreferredGatewayResolver,
};
use lib_network::{DataFrame, FCtrl, FOpts, FramePayload, MType};
use lib_storage::{CacheConfig, CacheError, CacheStore, InMemoryCacheStore};
use lib_types::{DevAddr, DevEui, GatewayId, JoinEui, SessionKeys};
use parking_lot::Mutex;

const DEV_EUI: DevEui = DevEui(0x0004_A30B_001C_0530);
const DEV_ADDR: DevAddr = DevAddr(0x0203_1980);

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<GatewayId>>,
}

#[async_trait]
impl DownlinkSender for RecordingSender {
    async fn send_downlink(&self, _frame: &[u8], gateway_id: &GatewayId) -> anyhow::Result<()> {
        self.sent.lock().push(gateway_id.clone());
        Ok(())
    }
}

fn keys() -> SessionKeys {
    SessionKeys {
        nwk_s_key: "263CBE4C30C062D18D992A0A4977C4C6".parse().unwrap(),
        app_s_key: "9CFE0558729EFAE33960F56EE855E706".parse().unwrap(),
    }
}

fn device(class: DeviceClass) -> DeviceRecord {
    DeviceRecord {
        dev_eui: DEV_EUI,
        join_eui: JoinEui(0x70B3_D57E_D000_0001),
        app_key: None,
        session: Some(DeviceSession {
            dev_addr: DEV_ADDR,
            keys: keys(),
            fcnt_up: 0,
            fcnt_down: 0,
        }),
        class,
        home_gateway: None,
        fixed_dev_addr: None,
        supports_32bit_fcnt: false,
    }
}

fn server(cache: Arc<dyn CacheStore>, class: DeviceClass, sender: Arc<RecordingSender>) -> NetworkServer {
    NetworkServer::builder(cache, Arc::new(InMemoryDeviceRegistry::new([device(class)])), sender)
        .config(CoordinatorConfig::default())
        .build()
}

fn uplink(mtype: MType, fcnt: u32) -> Vec<u8> {
    DataFrame::build(
        mtype,
        DEV_ADDR,
        FCtrl::default(),
        fcnt,
        FOpts::empty(),
        FramePayload::Application {
            fport: 2,
            data: vec![0x01, 0x02, 0x03],
        },
        &keys(),
    )
    .unwrap()
    .encode()
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_gateway_owns_each_uplink() {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::default());
    let sender = Arc::new(RecordingSender::default());
    let bytes = Arc::new(uplink(MType::ConfirmedDataUp, 1));

    let mut handles = Vec::new();
    for gw in ["gw-1", "gw-2", "gw-3", "gw-4"] {
        let server = server(Arc::clone(&cache), DeviceClass::A, Arc::clone(&sender));
        let bytes = Arc::clone(&bytes);
        handles.push(tokio::spawn(async move {
            server.handle_uplink(&bytes, &GatewayId::from(gw), -70.0).await.unwrap()
        }));
    }
    let decisions: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let owners: Vec<GatewayId> = decisions
        .iter()
        .filter_map(|d| match d {
            DownlinkDecision::Accepted { .. } => None,
            DownlinkDecision::Duplicate { owner } => Some(owner.clone()),
            other => panic!("unexpected decision {:?}", other),
        })
        .collect();
    assert_eq!(owners.len(), 3, "exactly one gateway accepts");
    assert!(owners.windows(2).all(|w| w[0] == w[1]));

    let sent = sender.sent.lock();
    assert_eq!(sent.len(), 1, "exactly one ACK");
    assert_eq!(sent[0], owners[0]);
}

#[tokio::test]
async fn test_fcnt_down_strictly_increases_across_gateways() {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::default());
    let sender = Arc::new(RecordingSender::default());
    let gw_1 = server(Arc::clone(&cache), DeviceClass::A, Arc::clone(&sender));
    let gw_2 = server(Arc::clone(&cache), DeviceClass::A, Arc::clone(&sender));

    let mut last = 0;
    for (fcnt_up, server, gw) in [
        (1, &gw_1, "gw-1"),
        (2, &gw_2, "gw-2"),
        (3, &gw_1, "gw-1"),
        (5, &gw_2, "gw-2"),
    ] {
        let decision = server
            .handle_uplink(&uplink(MType::ConfirmedDataUp, fcnt_up), &GatewayId::from(gw), -70.0)
            .await
            .unwrap();
        let DownlinkDecision::Accepted { next_fcnt_down: Some(fcnt_down), .. } = decision else {
            panic!("expected an issued counter, got {:?}", decision);
        };
        assert!(fcnt_down > last);
        last = fcnt_down;
    }

    // A late copy of an old uplink is a duplicate of the latest owner
    let late = gw_1
        .handle_uplink(&uplink(MType::ConfirmedDataUp, 3), &GatewayId::from("gw-1"), -70.0)
        .await
        .unwrap();
    assert_eq!(late, DownlinkDecision::Duplicate { owner: GatewayId::from("gw-2") });
}

#[tokio::test(start_paused = true)]
async fn test_strongest_gateway_is_preferred() {
    let store = Arc::new(InMemoryCacheStore::default());
    let cache: Arc<dyn CacheStore> = store.clone();
    let sender = Arc::new(RecordingSender::default());
    let bytes = uplink(MType::UnconfirmedDataUp, 1);

    let servers: Vec<_> = (0..3)
        .map(|_| server(Arc::clone(&cache), DeviceClass::C, Arc::clone(&sender)))
        .collect();
    let (gw_a, gw_b, gw_c) = (GatewayId::from("gw-a"), GatewayId::from("gw-b"), GatewayId::from("gw-c"));

    let (a, b, c) = tokio::join!(
        servers[0].handle_uplink(&bytes, &gw_a, -80.0),
        servers[1].handle_uplink(&bytes, &gw_b, -40.0),
        servers[2].handle_uplink(&bytes, &gw_c, -60.0),
    );

    let accepted = [a.unwrap(), b.unwrap(), c.unwrap()]
        .into_iter()
        .find_map(|d| match d {
            DownlinkDecision::Accepted { preferred_gateway, .. } => preferred_gateway,
            _ => None,
        })
        .unwrap();
    assert_eq!(accepted.preferred_gateway_id, Some(gw_b.clone()));
    assert!(!accepted.conflict);

    let resolver = PreferredGatewayResolver::new(cache, CoordinatorConfig::default());
    let current = resolver.current(DEV_EUI).await.unwrap().unwrap();
    assert_eq!(current.gateway_id, gw_b);
    assert_eq!(current.fcnt_up, 1);
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_uplink_acked_through_preferred_gateway() {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::default());
    let sender = Arc::new(RecordingSender::default());
    let bytes = uplink(MType::ConfirmedDataUp, 1);

    let weak = server(Arc::clone(&cache), DeviceClass::C, Arc::clone(&sender));
    let strong = server(Arc::clone(&cache), DeviceClass::C, Arc::clone(&sender));
    let (gw_a, gw_b) = (GatewayId::from("gw-a"), GatewayId::from("gw-b"));

    // gw-b hears the frame later but inside the collection window
    let (a, b) = tokio::join!(weak.handle_uplink(&bytes, &gw_a, -80.0), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        strong.handle_uplink(&bytes, &gw_b, -40.0).await
    });

    let DownlinkDecision::Accepted { next_fcnt_down, downlink_sent, preferred_gateway, .. } = a.unwrap() else {
        panic!("first gateway should own the uplink");
    };
    assert_eq!(next_fcnt_down, Some(1));
    assert!(downlink_sent);
    assert_eq!(preferred_gateway.unwrap().preferred_gateway_id, Some(gw_b.clone()));
    assert_eq!(b.unwrap(), DownlinkDecision::Duplicate { owner: gw_a });

    assert_eq!(*sender.sent.lock(), vec![gw_b]);
}

#[tokio::test]
async fn test_reset_forgets_counters() {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::default());
    let server = server(cache, DeviceClass::A, Arc::new(RecordingSender::default()));
    let gw = GatewayId::from("gw-1");

    server.handle_uplink(&uplink(MType::ConfirmedDataUp, 7), &gw, -70.0).await.unwrap();
    server.reset_device_cache(DEV_EUI).await.unwrap();

    // After a reset the old counter is new again, even from another gateway
    let decision = server
        .handle_uplink(&uplink(MType::ConfirmedDataUp, 7), &GatewayId::from("gw-2"), -70.0)
        .await
        .unwrap();
    let DownlinkDecision::Accepted { next_fcnt_down, .. } = decision else {
        panic!("expected accepted after reset");
    };
    assert_eq!(next_fcnt_down, Some(1));
}

/// Cache whose backend is unreachable
struct UnreachableCache {
    config: CacheConfig,
}

#[async_trait]
impl CacheStore for UnreachableCache {
    async fn get(&self, _: &str) -> lib_storage::Result<Option<String>> {
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn set(&self, _: &str, _: &str, _: Option<Duration>, _: bool) -> lib_storage::Result<bool> {
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn delete(&self, _: &str) -> lib_storage::Result<bool> {
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn list_append(&self, _: &str, _: &str, _: Duration) -> lib_storage::Result<usize> {
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn list_read(&self, _: &str) -> lib_storage::Result<Vec<String>> {
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn try_lock(&self, _: &str, _: &str, _: Duration) -> lib_storage::Result<bool> {
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn lock_release(&self, _: &str, _: &str) -> lib_storage::Result<bool> {
        Err(CacheError::Backend("connection refused".into()))
    }

    fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[tokio::test]
async fn test_backend_failure_is_retryable() {
    let cache: Arc<dyn CacheStore> = Arc::new(UnreachableCache {
        config: CacheConfig::default(),
    });
    let sender = Arc::new(RecordingSender::default());
    let server = server(cache, DeviceClass::A, Arc::clone(&sender));

    let err = server
        .handle_uplink(&uplink(MType::ConfirmedDataUp, 1), &GatewayId::from("gw-1"), -70.0)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(sender.sent.lock().is_empty());
}
