use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Timelike;
use stagger_agent::{ContentGenerator, GenerationError};
use stagger_channels::{DeliveryError, Dispatcher, OutboundEmail};
use stagger_core::{EmailAddress, JobId, SenderIdentity};
use stagger_scheduler::{
    CreateJobRequest, CycleOutcome, DispatchEvent, JobStore, ScheduleZone, SchedulerError,
    StaggerController, DEFAULT_SUBJECT,
};
use tokio::sync::{mpsc, watch};

// --- mocks -----------------------------------------------------------------

#[derive(Default)]
struct MockGenerator {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GenerationError::EmptyBody {
                provider: "mock".to_string(),
            });
        }
        Ok(format!("Body for: {prompt}"))
    }
}

#[derive(Default)]
struct MockDispatcher {
    delivered: Mutex<Vec<OutboundEmail>>,
    attempts: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl MockDispatcher {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    fn recover(&self, address: &str) {
        self.failing.lock().unwrap().remove(address);
    }

    fn delivered_to(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.to_header())
            .collect()
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let to = email.to_header();
        if self.failing.lock().unwrap().contains(&to) {
            return Err(DeliveryError::ConnectionFailed(format!("{to} unreachable")));
        }
        self.delivered.lock().unwrap().push(email.clone());
        Ok(())
    }
}

// --- helpers ---------------------------------------------------------------

struct Harness {
    controller: Arc<StaggerController>,
    generator: Arc<MockGenerator>,
    dispatcher: Arc<MockDispatcher>,
    fired_rx: mpsc::Receiver<JobId>,
}

fn harness_with(generator: MockGenerator, dispatcher: MockDispatcher) -> Harness {
    let generator = Arc::new(generator);
    let dispatcher = Arc::new(dispatcher);
    let (fired_tx, fired_rx) = mpsc::channel(64);
    let controller = Arc::new(StaggerController::new(
        Arc::new(JobStore::new()),
        generator.clone(),
        dispatcher.clone(),
        fired_tx,
    ));
    Harness {
        controller,
        generator,
        dispatcher,
        fired_rx,
    }
}

fn harness() -> Harness {
    harness_with(MockGenerator::default(), MockDispatcher::default())
}

fn addr(s: &str) -> EmailAddress {
    EmailAddress::parse(s).unwrap()
}

fn request(recipients: &[&str], cron: &str) -> CreateJobRequest {
    CreateJobRequest {
        sender: SenderIdentity::new(addr("me@example.com"), Some("Me".to_string())),
        recipients: recipients.iter().map(|r| addr(r)).collect(),
        prompt: "say hi".to_string(),
        subject: None,
        cron: cron.to_string(),
    }
}

// --- creation --------------------------------------------------------------

#[tokio::test]
async fn two_recipients_one_now_one_on_next_fire() {
    let h = harness();
    let id = h
        .controller
        .create_job(request(&["a@example.com", "b@example.com"], "*/2 * * * *"))
        .await
        .unwrap();

    assert_eq!(h.dispatcher.delivered_to(), vec!["a@example.com"]);
    let snap = h.controller.job(&id).unwrap();
    assert_eq!(snap.next_index, 1);
    assert_eq!(snap.subject, DEFAULT_SUBJECT);
    assert!(snap.next_fire_at.is_some());
    assert!(h.controller.is_scheduled(&id));

    let outcome = h.controller.fire(&id).await;
    assert_eq!(
        outcome,
        CycleOutcome::Delivered {
            index: 1,
            recipient: addr("b@example.com"),
            remaining: 0,
            completed: true,
        }
    );
    assert_eq!(h.dispatcher.delivered_to(), vec!["a@example.com", "b@example.com"]);
    assert!(matches!(
        h.controller.job(&id),
        Err(SchedulerError::JobNotFound { .. })
    ));
    assert!(!h.controller.is_scheduled(&id));
    assert_eq!(h.controller.active_jobs(), 0);
}

#[tokio::test]
async fn body_is_generated_once_and_shared() {
    let h = harness();
    let id = h
        .controller
        .create_job(request(&["a@example.com", "b@example.com", "c@example.com"], "* * * * *"))
        .await
        .unwrap();
    h.controller.fire(&id).await;
    h.controller.fire(&id).await;

    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);
    let delivered = h.dispatcher.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 3);
    assert!(delivered.iter().all(|e| e.body == "Body for: say hi"));
    assert!(delivered.iter().all(|e| e.sender.mailbox() == "Me <me@example.com>"));
}

#[tokio::test]
async fn single_recipient_job_finishes_during_creation() {
    let h = harness();
    let id = h
        .controller
        .create_job(request(&["solo@example.com"], "0 9 * * 1-5"))
        .await
        .unwrap();

    assert_eq!(h.dispatcher.delivered_to(), vec!["solo@example.com"]);
    assert_eq!(h.controller.active_jobs(), 0);
    assert!(!h.controller.is_scheduled(&id));
}

#[tokio::test]
async fn custom_subject_is_kept() {
    let h = harness();
    let mut req = request(&["a@example.com", "b@example.com"], "* * * * *");
    req.subject = Some("Quarterly update".to_string());
    let id = h.controller.create_job(req).await.unwrap();
    assert_eq!(h.controller.job(&id).unwrap().subject, "Quarterly update");
}

#[tokio::test]
async fn empty_recipient_list_is_rejected() {
    let h = harness();
    let err = h.controller.create_job(request(&[], "*/2 * * * *")).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidInput(_)));
    assert_eq!(err.code(), "INVALID_INPUT");
    assert_eq!(h.controller.active_jobs(), 0);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn bad_cron_is_rejected_before_generation() {
    let h = harness();
    let err = h
        .controller
        .create_job(request(&["a@example.com"], "not a cron"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidCronSchedule { .. }));
    assert_eq!(h.controller.active_jobs(), 0);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.dispatcher.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn jobs_created_after_shutdown_are_rolled_back() {
    let h = harness();
    h.controller.shutdown();
    let err = h
        .controller
        .create_job(request(&["a@example.com", "b@example.com"], "* * * * *"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ShuttingDown));
    assert_eq!(err.code(), "SHUTTING_DOWN");
    assert_eq!(h.controller.active_jobs(), 0);
    assert!(h.controller.jobs().is_empty());
    assert_eq!(h.dispatcher.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn configured_zone_moves_the_next_fire() {
    let (fired_tx, _fired_rx) = mpsc::channel(8);
    let controller = StaggerController::new(
        Arc::new(JobStore::new()),
        Arc::new(MockGenerator::default()),
        Arc::new(MockDispatcher::default()),
        fired_tx,
    )
    .with_zone("+02:00".parse::<ScheduleZone>().unwrap());
    let id = controller
        .create_job(request(&["a@example.com", "b@example.com"], "0 9 * * *"))
        .await
        .unwrap();

    let next = controller.job(&id).unwrap().next_fire_at.unwrap();
    assert_eq!((next.hour(), next.minute()), (7, 0));
}

#[tokio::test]
async fn generation_failure_creates_nothing() {
    let h = harness_with(
        MockGenerator {
            fail: true,
            ..MockGenerator::default()
        },
        MockDispatcher::default(),
    );
    let err = h
        .controller
        .create_job(request(&["a@example.com"], "* * * * *"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::GenerationFailed(_)));
    assert_eq!(h.controller.active_jobs(), 0);
    assert_eq!(h.dispatcher.attempts.load(Ordering::SeqCst), 0);
}

// --- delivery failures -----------------------------------------------------

#[tokio::test]
async fn failed_first_send_is_not_a_creation_error() {
    let h = harness();
    h.dispatcher.fail_for("a@example.com");
    let id = h
        .controller
        .create_job(request(&["a@example.com", "b@example.com"], "* * * * *"))
        .await
        .unwrap();

    let snap = h.controller.job(&id).unwrap();
    assert_eq!(snap.next_index, 0);
    assert_eq!(snap.failed_attempts, 1);
    assert!(snap.last_error.unwrap().contains("unreachable"));
    assert!(h.controller.is_scheduled(&id));
}

#[tokio::test]
async fn failed_send_is_retried_on_the_next_fire() {
    let h = harness();
    let id = h
        .controller
        .create_job(request(&["a@example.com", "b@example.com", "c@example.com"], "* * * * *"))
        .await
        .unwrap();

    h.dispatcher.fail_for("b@example.com");
    let outcome = h.controller.fire(&id).await;
    assert!(matches!(
        outcome,
        CycleOutcome::Failed { index: 1, attempts: 1, .. }
    ));
    assert!(matches!(
        h.controller.fire(&id).await,
        CycleOutcome::Failed { index: 1, attempts: 2, .. }
    ));
    assert_eq!(h.controller.job(&id).unwrap().next_index, 1);
    assert!(h.controller.is_scheduled(&id));

    h.dispatcher.recover("b@example.com");
    assert!(matches!(
        h.controller.fire(&id).await,
        CycleOutcome::Delivered { index: 1, .. }
    ));
    let snap = h.controller.job(&id).unwrap();
    assert_eq!(snap.next_index, 2);
    assert_eq!(snap.failed_attempts, 0);
    assert!(snap.last_error.is_none());
    assert_eq!(h.dispatcher.delivered_to(), vec!["a@example.com", "b@example.com"]);
}

// --- completion ------------------------------------------------------------

#[tokio::test]
async fn cycles_after_completion_do_nothing() {
    let h = harness();
    let id = h
        .controller
        .create_job(request(&["a@example.com"], "* * * * *"))
        .await
        .unwrap();
    let attempts = h.dispatcher.attempts.load(Ordering::SeqCst);

    assert_eq!(h.controller.run_dispatch_cycle(&id).await, CycleOutcome::NotFound);
    assert_eq!(h.controller.fire(&id).await, CycleOutcome::NotFound);
    assert_eq!(h.dispatcher.attempts.load(Ordering::SeqCst), attempts);
    assert_eq!(h.controller.active_jobs(), 0);
    assert!(!h.controller.is_scheduled(&id));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let h = harness();
    let id = JobId::from("never-created");
    assert_eq!(h.controller.run_dispatch_cycle(&id).await, CycleOutcome::NotFound);
    assert!(matches!(
        h.controller.job(&id),
        Err(SchedulerError::JobNotFound { .. })
    ));
}

// --- concurrency -----------------------------------------------------------

#[tokio::test]
async fn simultaneous_cycles_take_distinct_recipients() {
    let h = harness_with(
        MockGenerator::default(),
        MockDispatcher::with_delay(Duration::from_millis(20)),
    );
    let id = h
        .controller
        .create_job(request(&["a@example.com", "b@example.com", "c@example.com"], "* * * * *"))
        .await
        .unwrap();

    let (first, second, third) = tokio::join!(
        h.controller.run_dispatch_cycle(&id),
        h.controller.run_dispatch_cycle(&id),
        h.controller.run_dispatch_cycle(&id),
    );

    let mut indices: Vec<usize> = [&first, &second, &third]
        .iter()
        .filter_map(|o| match o {
            CycleOutcome::Delivered { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![1, 2]);
    assert!([&first, &second, &third]
        .iter()
        .any(|o| **o == CycleOutcome::NotFound));
    assert_eq!(
        h.dispatcher.delivered_to(),
        vec!["a@example.com", "b@example.com", "c@example.com"]
    );
    assert_eq!(h.controller.active_jobs(), 0);
}

#[tokio::test(start_paused = true)]
async fn status_reads_do_not_wait_for_a_send_in_flight() {
    let h = harness_with(
        MockGenerator::default(),
        MockDispatcher::with_delay(Duration::from_secs(30)),
    );
    let id = h
        .controller
        .create_job(request(&["a@example.com", "b@example.com", "c@example.com"], "* * * * *"))
        .await
        .unwrap();

    let controller = h.controller.clone();
    let fire_id = id.clone();
    let in_flight = tokio::spawn(async move { controller.fire(&fire_id).await });
    while h.dispatcher.attempts.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }

    // b@example.com is still being sent to
    let snap = h.controller.job(&id).unwrap();
    assert_eq!(snap.next_index, 1);
    assert_eq!(snap.next_recipient, Some(addr("b@example.com")));
    assert_eq!(h.controller.jobs().len(), 1);
    assert_eq!(h.dispatcher.delivered_to(), vec!["a@example.com"]);

    assert!(matches!(
        in_flight.await.unwrap(),
        CycleOutcome::Delivered { index: 1, .. }
    ));
    assert_eq!(h.controller.job(&id).unwrap().next_index, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_fires_never_double_send() {
    let h = harness_with(
        MockGenerator::default(),
        MockDispatcher::with_delay(Duration::from_millis(5)),
    );
    let recipients: Vec<String> = (0..8).map(|i| format!("r{i}@example.com")).collect();
    let refs: Vec<&str> = recipients.iter().map(String::as_str).collect();
    let id = h.controller.create_job(request(&refs, "* * * * *")).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let controller = h.controller.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move { controller.run_dispatch_cycle(&id).await }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(h.dispatcher.delivered_to(), recipients);
    assert_eq!(h.controller.active_jobs(), 0);
}

// --- events and the fire loop ----------------------------------------------

#[tokio::test]
async fn events_follow_each_cycle() {
    let h = harness();
    let mut events = h.controller.subscribe();
    h.dispatcher.fail_for("b@example.com");
    let id = h
        .controller
        .create_job(request(&["a@example.com", "b@example.com"], "* * * * *"))
        .await
        .unwrap();
    h.controller.fire(&id).await;
    h.dispatcher.recover("b@example.com");
    h.controller.fire(&id).await;

    assert!(matches!(
        events.recv().await.unwrap(),
        DispatchEvent::Delivered { index: 0, remaining: 1, .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        DispatchEvent::Failed { index: 1, attempts: 1, .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        DispatchEvent::Delivered { index: 1, remaining: 0, .. }
    ));
    assert_eq!(
        events.recv().await.unwrap(),
        DispatchEvent::Completed { job_id: id }
    );
}

#[tokio::test(start_paused = true)]
async fn run_loop_drives_job_to_completion() {
    let h = harness();
    let Harness {
        controller,
        dispatcher,
        fired_rx,
        ..
    } = h;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(controller.clone().run(fired_rx, shutdown_rx));

    let mut events = controller.subscribe();
    let id = controller
        .create_job(request(&["a@example.com", "b@example.com", "c@example.com"], "* * * * *"))
        .await
        .unwrap();

    let completed = tokio::time::timeout(Duration::from_secs(3600), async {
        loop {
            if let Ok(DispatchEvent::Completed { job_id }) = events.recv().await {
                return job_id;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(completed, id);
    assert_eq!(
        dispatcher.delivered_to(),
        vec!["a@example.com", "b@example.com", "c@example.com"]
    );
    assert_eq!(controller.active_jobs(), 0);

    shutdown_tx.send(true).unwrap();
    runner.await.unwrap();
}

#[tokio::test]
async fn run_loop_exits_when_the_shutdown_sender_is_dropped() {
    let Harness {
        controller,
        fired_rx,
        ..
    } = harness();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(controller.clone().run(fired_rx, shutdown_rx));

    drop(shutdown_tx);
    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("run loop should stop once its shutdown sender is gone")
        .unwrap();
}
