mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::FakeDevice;
use otapush_device_client::{HttpDevice, SimpleTarget, simple_upload};
use otapush_protocol::build_container;
use otapush_transfer::MemorySource;
use otapush_updater::{
    ConnectionIndicator, DeviceConnection, OtaUpdate, ReleasePoller, SessionProbe, UpdateConfig,
    UpdateError, UpdateEvent, check_release, fetch_status, start_release_update,
};
use tokio::sync::mpsc;

fn fast_config() -> UpdateConfig {
    UpdateConfig {
        retry_delay: Duration::from_millis(10),
        log_checksum: false,
        ..Default::default()
    }
}

fn container() -> Vec<u8> {
    let fw: Vec<u8> = (0..150_000u32).map(|i| (i % 241) as u8).collect();
    let fs: Vec<u8> = (0..50_000u32).map(|i| (i % 7) as u8).collect();
    build_container(&fw, &fs).unwrap()
}

#[tokio::test]
async fn test_full_update_over_http() {
    let fake = FakeDevice::start().await;
    let device = HttpDevice::new(&fake.url()).unwrap();
    let image = container();
    let src = MemorySource::new(image.clone());

    let summary = OtaUpdate::new(fast_config()).run(&device, &src).await.unwrap();

    assert_eq!(summary.total, image.len() as u64);
    assert_eq!(summary.chunk_writes, 4);
    assert_eq!(summary.message, "OK, rebooting");
    fake.with(|st| {
        assert_eq!(st.applied.as_deref(), Some(image.as_slice()));
        assert_eq!(st.chunk_log, vec![0, 65_536, 131_072, 196_608]);
        assert!(st.session.is_none());
    });
}

#[tokio::test]
async fn test_dropped_chunk_is_resent() {
    let fake = FakeDevice::start().await;
    fake.with(|st| {
        st.drop_chunk_at.insert(65_536);
    });
    let device = HttpDevice::new(&fake.url()).unwrap();
    let image = container();
    let src = MemorySource::new(image.clone());

    let summary = OtaUpdate::new(fast_config()).run(&device, &src).await.unwrap();

    assert_eq!(summary.reconciliations, 1);
    fake.with(|st| {
        assert_eq!(st.chunk_log, vec![0, 65_536, 65_536, 131_072, 196_608]);
        assert_eq!(st.applied.as_deref(), Some(image.as_slice()));
    });
}

#[tokio::test]
async fn test_lost_ack_is_not_resent() {
    let fake = FakeDevice::start().await;
    fake.with(|st| {
        st.lose_ack_at.insert(65_536);
    });
    let device = HttpDevice::new(&fake.url()).unwrap();
    let image = container();
    let src = MemorySource::new(image.clone());

    OtaUpdate::new(fast_config()).run(&device, &src).await.unwrap();

    fake.with(|st| {
        assert_eq!(st.chunk_log, vec![0, 65_536, 131_072, 196_608]);
        assert_eq!(st.applied.as_deref(), Some(image.as_slice()));
    });
}

#[tokio::test]
async fn test_resumes_session_left_by_earlier_attempt() {
    let fake = FakeDevice::start().await;
    let image = container();
    fake.with(|st| {
        st.session = Some(common::FakeSession {
            id: "sess-old".into(),
            total: image.len() as u64,
            data: image[..65_536].to_vec(),
        });
    });
    let device = HttpDevice::new(&fake.url()).unwrap();
    let src = MemorySource::new(image.clone());

    let summary = OtaUpdate::new(fast_config()).run(&device, &src).await.unwrap();

    assert_eq!(summary.session_id, "sess-old");
    assert_eq!(summary.resumed_from, 65_536);
    assert_eq!(summary.chunk_writes, 3);
    fake.with(|st| assert_eq!(st.applied.as_deref(), Some(image.as_slice())));
}

#[tokio::test]
async fn test_device_rejects_non_container() {
    let fake = FakeDevice::start().await;
    let device = HttpDevice::new(&fake.url()).unwrap();
    let src = MemorySource::new(vec![0xAB; 10_000]);

    let err = OtaUpdate::new(fast_config())
        .run(&device, &src)
        .await
        .unwrap_err();

    match err {
        UpdateError::FinalizeRejected(msg) => assert!(msg.contains("invalid container"), "{msg}"),
        other => panic!("expected FinalizeRejected, got {other:?}"),
    }
    fake.with(|st| assert!(st.applied.is_none()));
}

#[tokio::test]
async fn test_slow_finalize_is_indeterminate() {
    let fake = FakeDevice::start().await;
    fake.with(|st| st.finalize_delay = Some(Duration::from_secs(5)));
    let device = HttpDevice::new(&fake.url()).unwrap();
    let src = MemorySource::new(container());
    let config = UpdateConfig {
        finalize_timeout: Duration::from_millis(200),
        ..fast_config()
    };

    let err = OtaUpdate::new(config).run(&device, &src).await.unwrap_err();

    // The device has not applied anything yet, so the probe still sees
    // the session.
    match err {
        UpdateError::FinalizeIndeterminate(msg) => {
            assert!(msg.contains("timed out"), "{msg}");
            assert!(msg.contains(&SessionProbe::Open {
                have: 200_016,
                total: 200_016
            }
            .to_string()), "{msg}");
        }
        other => panic!("expected FinalizeIndeterminate, got {other:?}"),
    }
}

#[tokio::test]
async fn test_events_over_http() {
    let fake = FakeDevice::start().await;
    let device = HttpDevice::new(&fake.url()).unwrap();
    let src = MemorySource::new(container());
    let mut update = OtaUpdate::new(fast_config());
    let mut rx = update.take_events().unwrap();

    update.run(&device, &src).await.unwrap();

    let mut pcts = Vec::new();
    let mut done = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        match ev {
            UpdateEvent::Progress(p) => pcts.push(p),
            UpdateEvent::Done { success, .. } => done.push(success),
            _ => {}
        }
    }
    assert_eq!(pcts.first(), Some(&0));
    assert_eq!(pcts.last(), Some(&100));
    assert!(pcts.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(done, vec![true]);
}

#[tokio::test]
async fn test_simple_upload_firmware() {
    let fake = FakeDevice::start().await;
    let device = HttpDevice::new(&fake.url()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let target = SimpleTarget::for_path(Path::new("app.bin")).unwrap();

    let reply = simple_upload(&device, target, "app.bin", vec![1, 2, 3, 4], &tx)
        .await
        .unwrap();

    assert_eq!(reply, "Update OK");
    fake.with(|st| {
        assert_eq!(
            st.simple_uploads,
            vec![(
                "/api/ota/upload".to_string(),
                "app.bin".to_string(),
                vec![1, 2, 3, 4]
            )]
        );
    });

    let mut pcts = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if let UpdateEvent::Progress(p) = ev {
            pcts.push(p);
        }
    }
    assert_eq!(pcts, vec![0, 100]);
}

#[tokio::test]
async fn test_simple_upload_container_endpoint() {
    let fake = FakeDevice::start().await;
    let device = HttpDevice::new(&fake.url()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    simple_upload(&device, SimpleTarget::Container, "update.zip", container(), &tx)
        .await
        .unwrap();

    fake.with(|st| assert_eq!(st.simple_uploads[0].0, "/api/ota/updatezip"));
}

#[tokio::test]
async fn test_status_and_release_calls() {
    let fake = FakeDevice::start().await;
    let device = HttpDevice::new(&fake.url()).unwrap();

    let timeout = Duration::from_secs(5);

    let status = fetch_status(&device, timeout).await.unwrap();
    assert_eq!(
        ConnectionIndicator::from_status(Some(&status)),
        ConnectionIndicator::Online
    );
    assert_eq!(status.app.version, "1.2.0");

    let release = check_release(&device, timeout).await.unwrap();
    assert_eq!(release.tag, "v2.0.1");
    assert_eq!(
        start_release_update(&device, timeout).await.unwrap(),
        "Update started"
    );
}

#[tokio::test]
async fn test_release_poller_over_http() {
    let fake = FakeDevice::start().await;
    fake.with(|st| {
        st.release_progress = vec![
            serde_json::json!({ "active": true, "pct": 40, "phase": "download", "msg": "" }),
            serde_json::json!({ "active": false, "pct": 100, "phase": "done", "msg": "rebooting" }),
        ];
    });
    let device: Arc<dyn DeviceConnection> = Arc::new(HttpDevice::new(&fake.url()).unwrap());

    let (poller, mut rx) =
        ReleasePoller::spawn(device, Duration::from_millis(20), Duration::from_secs(5));
    let mut phases = Vec::new();
    while let Some(p) = rx.recv().await {
        phases.push(p.phase);
    }
    poller.wait().await;

    assert_eq!(phases, vec!["download".to_string(), "done".to_string()]);
}
