use std::sync::Arc;
use std::time::{Duration, Instant};

use chat_core::mocks::{MockCompletion, MockSummarizer};
use chat_core::{ChatCore, CoreConfig, DispatchError, HistoryPolicy, PoolConfig, Role, APOLOGY};
use protocol::{DispatchAck, JobStatus, StatusReply};
use tokio::sync::Semaphore;

fn config(history: HistoryPolicy) -> CoreConfig {
    CoreConfig {
        history,
        pool: PoolConfig {
            workers: 2,
            queue_capacity: 8,
            job_timeout: Duration::from_secs(5),
        },
    }
}

fn start(completion: Arc<MockCompletion>, summarizer: Arc<MockSummarizer>, config: CoreConfig) -> ChatCore {
    ChatCore::start(config, completion, summarizer)
}

async fn wait_terminal(core: &ChatCore, request_id: &str) -> StatusReply {
    for _ in 0..500 {
        let reply = core.poll(request_id);
        if reply.status != JobStatus::Processing {
            return reply;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {request_id} never finished");
}

async fn wait_for_calls(completion: &MockCompletion, n: usize) {
    for _ in 0..500 {
        if completion.prompts().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("completion was never called {n} times");
}

async fn wait_for_summaries(summarizer: &MockSummarizer, n: usize) {
    for _ in 0..500 {
        if summarizer.calls().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("summarizer was never called {n} times");
}

#[tokio::test]
async fn hello_scenario_completes_once_then_not_found() {
    let completion = Arc::new(MockCompletion::reply("Hi there"));
    let core = start(completion.clone(), Arc::new(MockSummarizer::reply("-")), CoreConfig::default());

    let ack = core.dispatch("s1", "hello", Some("r1".into())).unwrap();
    assert_eq!(ack, DispatchAck::processing("r1"));

    let reply = wait_terminal(&core, "r1").await;
    assert_eq!(reply, StatusReply::complete("<p>Hi there</p>"));
    assert_eq!(core.poll("r1"), StatusReply::not_found());

    assert_eq!(completion.prompts(), vec!["user: hello".to_string()]);
    let conv = core.sessions().get("s1").unwrap();
    assert_eq!(conv.lock().prompt(), "user: hello\nassistant: Hi there");
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let core = start(
        Arc::new(MockCompletion::reply("x")),
        Arc::new(MockSummarizer::reply("-")),
        CoreConfig::default(),
    );
    assert_eq!(core.poll("never-dispatched"), StatusReply::not_found());
}

#[tokio::test]
async fn non_ok_status_becomes_error_job() {
    let completion = Arc::new(MockCompletion::status(401, "Invalid API-key provided."));
    let core = start(completion, Arc::new(MockSummarizer::reply("-")), CoreConfig::default());

    core.dispatch("s1", "hello", Some("r1".into())).unwrap();
    assert_eq!(wait_terminal(&core, "r1").await, StatusReply::error(APOLOGY));
    // error jobs are evicted on read too
    assert_eq!(core.poll("r1"), StatusReply::not_found());

    let conv = core.sessions().get("s1").unwrap();
    assert_eq!(conv.lock().len(), 1);
}

#[tokio::test]
async fn missing_credentials_still_dispatches() {
    let completion = Arc::new(MockCompletion::failing("completion api key is not configured"));
    let core = start(completion, Arc::new(MockSummarizer::reply("-")), CoreConfig::default());

    let ack = core.dispatch("s1", "hello", Some("r1".into())).unwrap();
    assert_eq!(ack.status, JobStatus::Processing);
    assert_eq!(wait_terminal(&core, "r1").await, StatusReply::error(APOLOGY));
}

#[tokio::test]
async fn empty_completion_text_is_an_error() {
    let core = start(
        Arc::new(MockCompletion::reply("   ")),
        Arc::new(MockSummarizer::reply("-")),
        CoreConfig::default(),
    );
    core.dispatch("s1", "hello", Some("r1".into())).unwrap();
    assert_eq!(wait_terminal(&core, "r1").await.status, JobStatus::Error);
}

#[tokio::test]
async fn dispatch_does_not_wait_for_completion() {
    let gate = Arc::new(Semaphore::new(0));
    let completion = Arc::new(MockCompletion::reply("done").gated(gate.clone()));
    let core = start(completion.clone(), Arc::new(MockSummarizer::reply("-")), CoreConfig::default());

    let started = Instant::now();
    let ack = core.dispatch("s1", "hello", Some("slow".into())).unwrap();
    assert!(started.elapsed() < Duration::from_millis(50));
    assert_eq!(ack.status, JobStatus::Processing);

    wait_for_calls(&completion, 1).await;
    assert_eq!(core.poll("slow"), StatusReply::processing());
    assert_eq!(core.poll("slow"), StatusReply::processing());

    gate.add_permits(1);
    assert_eq!(wait_terminal(&core, "slow").await, StatusReply::complete("<p>done</p>"));
}

#[tokio::test]
async fn prompt_under_threshold_is_full_transcript() {
    let completion = Arc::new(MockCompletion::reply("Hi there"));
    let summarizer = Arc::new(MockSummarizer::reply("unused"));
    let core = start(completion.clone(), summarizer.clone(), config(HistoryPolicy::Summarize { threshold: 10 }));

    core.dispatch("s1", "hello", Some("r1".into())).unwrap();
    wait_terminal(&core, "r1").await;
    core.dispatch("s1", "again", Some("r2".into())).unwrap();
    wait_terminal(&core, "r2").await;

    let prompts = completion.prompts();
    assert_eq!(prompts[1], "user: hello\nassistant: Hi there\nuser: again");
    assert!(summarizer.calls().is_empty());
}

#[tokio::test]
async fn history_over_threshold_is_collapsed_to_summary() {
    let completion = Arc::new(MockCompletion::reply("ok"));
    let summarizer = Arc::new(MockSummarizer::reply("They greeted each other."));
    let core = start(completion.clone(), summarizer.clone(), config(HistoryPolicy::Summarize { threshold: 2 }));

    core.dispatch("s1", "one", Some("r1".into())).unwrap();
    wait_terminal(&core, "r1").await;
    // user + assistant = 2, the next user message pushes it past the threshold
    core.dispatch("s1", "two", Some("r2".into())).unwrap();
    assert_eq!(wait_terminal(&core, "r2").await.status, JobStatus::Complete);

    let prompts = completion.prompts();
    assert_eq!(prompts[0], "user: one");
    assert_eq!(prompts[1], "system: They greeted each other.");

    let calls = summarizer.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0][1].content.ends_with("user: one\nassistant: ok\nuser: two"));

    let history = core.sessions().get("s1").unwrap().lock().snapshot();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::System);
    assert_eq!(history[0].content, "They greeted each other.");
    assert_eq!(history[1].role, Role::Assistant);
}

#[tokio::test]
async fn reset_during_summary_leaves_new_history_alone() {
    let gate = Arc::new(Semaphore::new(0));
    let completion = Arc::new(MockCompletion::reply("ok"));
    let summarizer = Arc::new(MockSummarizer::reply("old summary").gated(gate.clone()));
    let core = start(completion, summarizer.clone(), config(HistoryPolicy::Summarize { threshold: 1 }));

    core.dispatch("s1", "a", Some("r1".into())).unwrap();
    wait_terminal(&core, "r1").await;
    core.dispatch("s1", "b", Some("r2".into())).unwrap();
    wait_for_summaries(&summarizer, 1).await;

    assert!(core.reset_session("s1"));
    core.sessions().get_or_create("s1").lock().push_user("fresh");

    gate.add_permits(1);
    assert_eq!(wait_terminal(&core, "r2").await.status, JobStatus::Complete);

    let history = core.sessions().get("s1").unwrap().lock().snapshot();
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "fresh");
    assert!(history.iter().all(|m| m.role != Role::System));
}

#[tokio::test]
async fn one_summary_in_flight_per_conversation() {
    let gate = Arc::new(Semaphore::new(0));
    let completion = Arc::new(MockCompletion::reply("ok"));
    let summarizer = Arc::new(MockSummarizer::reply("earlier turns").gated(gate.clone()));
    let core = start(completion.clone(), summarizer.clone(), config(HistoryPolicy::Summarize { threshold: 1 }));

    core.dispatch("s1", "a", Some("r1".into())).unwrap();
    wait_terminal(&core, "r1").await;
    core.dispatch("s1", "b", Some("r2".into())).unwrap();
    wait_for_summaries(&summarizer, 1).await;

    // still over the threshold, but r2 owns the summary slot
    core.dispatch("s1", "c", Some("r3".into())).unwrap();
    assert_eq!(wait_terminal(&core, "r3").await.status, JobStatus::Complete);
    assert_eq!(summarizer.calls().len(), 1);
    assert_eq!(completion.prompts()[1], "user: a\nassistant: ok\nuser: b\nuser: c");

    gate.add_permits(1);
    assert_eq!(wait_terminal(&core, "r2").await.status, JobStatus::Complete);
    assert_eq!(summarizer.calls().len(), 1);

    // the summary replaced a, ok, b; everything appended after the snapshot survives
    let history = core.sessions().get("s1").unwrap().lock().snapshot();
    let lines: Vec<_> = history.iter().map(|m| format!("{}: {}", m.role, m.content)).collect();
    assert_eq!(
        lines,
        vec!["system: earlier turns", "user: c", "assistant: ok", "assistant: ok"]
    );
}

#[tokio::test]
async fn failed_summary_text_becomes_conversation_content() {
    let completion = Arc::new(MockCompletion::reply("ok"));
    let summarizer = Arc::new(MockSummarizer::failing("summarizer api token is not configured"));
    let core = start(completion.clone(), summarizer, config(HistoryPolicy::Summarize { threshold: 0 }));

    core.dispatch("s1", "hi", Some("r1".into())).unwrap();
    assert_eq!(wait_terminal(&core, "r1").await.status, JobStatus::Complete);
    assert_eq!(
        completion.prompts()[0],
        "system: Summary unavailable: summarizer api token is not configured"
    );
}

#[tokio::test]
async fn window_policy_never_summarizes() {
    let completion = Arc::new(MockCompletion::reply("ok"));
    let summarizer = Arc::new(MockSummarizer::reply("unused"));
    let core = start(completion.clone(), summarizer.clone(), config(HistoryPolicy::Window { max_messages: 2 }));

    for (i, text) in ["a", "b", "c"].iter().enumerate() {
        let id = format!("r{i}");
        core.dispatch("s1", text, Some(id.clone())).unwrap();
        wait_terminal(&core, &id).await;
    }

    assert!(summarizer.calls().is_empty());
    assert_eq!(completion.prompts()[2], "assistant: ok\nuser: c");
}

#[tokio::test]
async fn hung_completion_times_out_into_error() {
    let mut cfg = CoreConfig::default();
    cfg.pool.job_timeout = Duration::from_millis(50);
    let core = start(Arc::new(MockCompletion::hanging()), Arc::new(MockSummarizer::reply("-")), cfg);

    core.dispatch("s1", "hello", Some("r1".into())).unwrap();
    assert_eq!(wait_terminal(&core, "r1").await, StatusReply::error(APOLOGY));
}

#[tokio::test]
async fn in_flight_request_id_cannot_be_reused() {
    let gate = Arc::new(Semaphore::new(0));
    let completion = Arc::new(MockCompletion::reply("ok").gated(gate.clone()));
    let core = start(completion, Arc::new(MockSummarizer::reply("-")), CoreConfig::default());

    core.dispatch("s1", "first", Some("r1".into())).unwrap();
    let err = core.dispatch("s1", "second", Some("r1".into())).unwrap_err();
    assert_eq!(err, DispatchError::DuplicateRequest("r1".into()));

    // the rejected message never reached the history
    assert_eq!(core.sessions().get("s1").unwrap().lock().prompt(), "user: first");
    gate.add_permits(1);
    wait_terminal(&core, "r1").await;
}

#[tokio::test]
async fn full_queue_is_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let completion = Arc::new(MockCompletion::reply("ok").gated(gate.clone()));
    let cfg = CoreConfig {
        history: HistoryPolicy::default(),
        pool: PoolConfig { workers: 1, queue_capacity: 1, job_timeout: Duration::from_secs(5) },
    };
    let core = start(completion.clone(), Arc::new(MockSummarizer::reply("-")), cfg);

    core.dispatch("s1", "a", Some("r1".into())).unwrap();
    wait_for_calls(&completion, 1).await;
    core.dispatch("s2", "b", Some("r2".into())).unwrap();

    assert_eq!(core.dispatch("s3", "c", Some("r3".into())).unwrap_err(), DispatchError::QueueFull);
    assert!(!core.jobs().contains("r3"));
    assert!(core.sessions().get("s3").is_none());

    gate.add_permits(2);
    wait_terminal(&core, "r1").await;
    wait_terminal(&core, "r2").await;
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let core = start(
        Arc::new(MockCompletion::reply("x")),
        Arc::new(MockSummarizer::reply("-")),
        CoreConfig::default(),
    );
    assert_eq!(core.dispatch("s1", "   ", None).unwrap_err(), DispatchError::EmptyMessage);
}

#[tokio::test]
async fn missing_request_id_is_generated() {
    let core = start(
        Arc::new(MockCompletion::reply("x")),
        Arc::new(MockSummarizer::reply("-")),
        CoreConfig::default(),
    );
    let a = core.dispatch("s1", "one", None).unwrap();
    let b = core.dispatch("s1", "two", Some("  ".into())).unwrap();
    assert!(!a.request_id.is_empty());
    assert_ne!(a.request_id, b.request_id);
    wait_terminal(&core, &a.request_id).await;
    wait_terminal(&core, &b.request_id).await;
}

#[tokio::test]
async fn respond_now_returns_html_and_folds() {
    let completion = Arc::new(MockCompletion::reply("**Hi**"));
    let core = start(completion, Arc::new(MockSummarizer::reply("-")), CoreConfig::default());

    let reply = core.respond_now("s1", "hello").await.unwrap();
    assert_eq!(reply, StatusReply::complete("<p><strong>Hi</strong></p>"));
    assert_eq!(
        core.sessions().get("s1").unwrap().lock().prompt(),
        "user: hello\nassistant: **Hi**"
    );
    assert!(core.jobs().is_empty());
}

#[tokio::test]
async fn respond_now_failure_is_apology() {
    let core = start(
        Arc::new(MockCompletion::status(500, "boom")),
        Arc::new(MockSummarizer::reply("-")),
        CoreConfig::default(),
    );
    assert_eq!(core.respond_now("s1", "hello").await.unwrap(), StatusReply::error(APOLOGY));
}

#[tokio::test]
async fn shutdown_cancels_running_jobs() {
    let completion = Arc::new(MockCompletion::hanging());
    let mut cfg = CoreConfig::default();
    cfg.pool.job_timeout = Duration::from_secs(60);
    let core = start(completion.clone(), Arc::new(MockSummarizer::reply("-")), cfg);

    core.dispatch("s1", "hello", Some("r1".into())).unwrap();
    wait_for_calls(&completion, 1).await;
    core.shutdown();

    assert_eq!(wait_terminal(&core, "r1").await, StatusReply::error(APOLOGY));
    assert_eq!(core.dispatch("s1", "again", None).unwrap_err(), DispatchError::ShutDown);
}

#[tokio::test]
async fn shutdown_fails_queued_jobs_too() {
    let completion = Arc::new(MockCompletion::hanging());
    let cfg = CoreConfig {
        history: HistoryPolicy::default(),
        pool: PoolConfig { workers: 1, queue_capacity: 8, job_timeout: Duration::from_secs(60) },
    };
    let core = start(completion.clone(), Arc::new(MockSummarizer::reply("-")), cfg);

    core.dispatch("s1", "running", Some("r1".into())).unwrap();
    wait_for_calls(&completion, 1).await;
    core.dispatch("s2", "queued", Some("r2".into())).unwrap();
    core.shutdown();

    assert_eq!(wait_terminal(&core, "r1").await, StatusReply::error(APOLOGY));
    assert_eq!(wait_terminal(&core, "r2").await, StatusReply::error(APOLOGY));
    // the queued job was failed, never sent upstream
    assert_eq!(completion.prompts().len(), 1);
}

#[tokio::test]
async fn reset_session_forgets_history() {
    let core = start(
        Arc::new(MockCompletion::reply("ok")),
        Arc::new(MockSummarizer::reply("-")),
        CoreConfig::default(),
    );
    core.dispatch("s1", "hello", Some("r1".into())).unwrap();
    wait_terminal(&core, "r1").await;

    assert!(core.reset_session("s1"));
    assert!(core.sessions().get("s1").is_none());
    assert!(!core.reset_session("s1"));
}
