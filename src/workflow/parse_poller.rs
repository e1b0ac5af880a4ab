//! 解析状态轮询 - 流程层
//!
//! 核心职责：驱动单个文件从提交到终态的状态机
//!
//! - 每个文件 id 最多一个轮询循环，多个订阅者共享同一循环
//! - 每个订阅者看到的状态序列单调不回退
//! - 订阅取消后不再收到任何回调；最后一个订阅者取消时循环随之停止
//! - 瞬时错误不终止循环，连续失败达到上限后以 `parse_failed` + 不可达标记结束

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::models::FileStatus;
use crate::services::ParseService;
use crate::utils::lock;

/// 一次状态推进
#[derive(Debug, Clone, PartialEq)]
pub struct ParseUpdate {
    pub file_id: String,
    pub status: FileStatus,
    /// 服务端附带的说明，或终止原因
    pub message: Option<String>,
    /// 因连续查询失败而放弃
    pub unreachable: bool,
}

/// 状态回调
pub type UpdateFn = Arc<dyn Fn(ParseUpdate) + Send + Sync>;

/// 查询失败回调（旁路通知，不影响循环），参数为 (文件 id, 错误)
pub type PollErrorFn = Arc<dyn Fn(&str, &ClientError) + Send + Sync>;

/// 订阅选项
///
/// 间隔与失败上限由创建循环的第一个订阅者决定
#[derive(Clone)]
pub struct SubscribeOptions {
    pub interval: Duration,
    pub max_consecutive_failures: u32,
    pub on_error: Option<PollErrorFn>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_consecutive_failures: 5,
            on_error: None,
        }
    }
}

impl SubscribeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            max_consecutive_failures: config.max_consecutive_poll_failures,
            on_error: None,
        }
    }

    pub fn on_error(mut self, callback: PollErrorFn) -> Self {
        self.on_error = Some(callback);
        self
    }
}

// ========== 订阅者 ==========

struct Listener {
    id: u64,
    cancelled: AtomicBool,
    /// 已投递的最高状态序号；投递期间持锁，保证同一订阅者的回调串行
    last_rank: Mutex<Option<u8>>,
    on_update: UpdateFn,
    on_error: Option<PollErrorFn>,
}

impl Listener {
    fn offer(&self, update: &ParseUpdate) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        let mut last = lock(&self.last_rank);
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        let rank = update.status.rank();
        if last.map_or(true, |prev| rank > prev) {
            *last = Some(rank);
            (self.on_update)(update.clone());
        }
    }

    fn report(&self, file_id: &str, err: &ClientError) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        if let Some(callback) = &self.on_error {
            callback(file_id, err);
        }
    }
}

// ========== 轮询循环 ==========

#[derive(Default)]
struct LoopState {
    listeners: Vec<Arc<Listener>>,
    latest: Option<ParseUpdate>,
}

struct PollLoop {
    file_id: String,
    token: CancellationToken,
    state: Mutex<LoopState>,
}

impl PollLoop {
    fn new(file_id: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            token: CancellationToken::new(),
            state: Mutex::new(LoopState::default()),
        }
    }

    /// 加入订阅者；循环已结束时返回 `false`
    fn attach(&self, listener: Arc<Listener>) -> bool {
        let mut state = lock(&self.state);
        if self.token.is_cancelled() {
            return false;
        }
        state.listeners.push(listener);
        true
    }

    /// 移除订阅者，没有订阅者时停止循环
    fn detach(&self, listener_id: u64) {
        let mut state = lock(&self.state);
        state.listeners.retain(|l| l.id != listener_id);
        if state.listeners.is_empty() {
            self.token.cancel();
        }
    }

    fn latest(&self) -> Option<ParseUpdate> {
        lock(&self.state).latest.clone()
    }

    fn listeners(&self) -> Vec<Arc<Listener>> {
        lock(&self.state).listeners.clone()
    }

    fn deliver(&self, update: ParseUpdate) {
        let listeners = {
            let mut state = lock(&self.state);
            state.latest = Some(update.clone());
            state.listeners.clone()
        };
        for listener in listeners {
            listener.offer(&update);
        }
    }

    fn report(&self, err: &ClientError) {
        for listener in self.listeners() {
            listener.report(&self.file_id, err);
        }
    }

    /// 循环自然结束
    fn finish(&self) {
        let _state = lock(&self.state);
        self.token.cancel();
    }

    /// 强制停止：所有订阅者一并视为已取消
    fn shutdown(&self) {
        let mut state = lock(&self.state);
        for listener in state.listeners.drain(..) {
            listener.cancelled.store(true, Ordering::SeqCst);
        }
        self.token.cancel();
    }
}

// ========== 订阅句柄 ==========

/// 订阅句柄（取消令牌）
///
/// 丢弃句柄不会取消订阅，需要显式调用 `cancel`
pub struct Subscription {
    listener: Arc<Listener>,
    poll_loop: Arc<PollLoop>,
}

impl Subscription {
    pub fn file_id(&self) -> &str {
        &self.poll_loop.file_id
    }

    /// 取消订阅，可重复调用
    ///
    /// 返回后不会再开始新的回调
    pub fn cancel(&self) {
        if !self.listener.cancelled.swap(true, Ordering::SeqCst) {
            debug!("[文件 {}] 取消订阅 #{}", self.file_id(), self.listener.id);
            self.poll_loop.detach(self.listener.id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.listener.cancelled.load(Ordering::SeqCst)
    }

    /// 等待轮询循环结束（到达终态、放弃或被取消）
    pub async fn finished(&self) {
        self.poll_loop.token.cancelled().await
    }
}

// ========== 轮询器 ==========

type LoopRegistry = Arc<Mutex<HashMap<String, Arc<PollLoop>>>>;

/// 解析状态轮询器
pub struct ParsePoller {
    parse: Arc<ParseService>,
    loops: LoopRegistry,
    next_listener: AtomicU64,
}

impl ParsePoller {
    pub fn new(parse: Arc<ParseService>) -> Self {
        Self {
            parse,
            loops: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(1),
        }
    }

    /// 订阅文件的解析状态
    ///
    /// # 参数
    /// - `file_id`: 文件 id
    /// - `on_update`: 状态推进回调（单调、终态后不再调用）
    /// - `options`: 轮询间隔、失败上限与错误旁路
    ///
    /// # 返回
    /// 订阅句柄；同一文件已有循环时直接加入，不会再启动第二个循环
    pub fn subscribe(
        &self,
        file_id: &str,
        on_update: UpdateFn,
        options: SubscribeOptions,
    ) -> Subscription {
        let listener = Arc::new(Listener {
            id: self.next_listener.fetch_add(1, Ordering::SeqCst),
            cancelled: AtomicBool::new(false),
            last_rank: Mutex::new(None),
            on_update,
            on_error: options.on_error.clone(),
        });

        let (poll_loop, spawned) = {
            let mut loops = lock(&self.loops);
            let existing = loops
                .get(file_id)
                .filter(|l| l.attach(listener.clone()))
                .cloned();
            match existing {
                Some(existing) => (existing, false),
                None => {
                    let poll_loop = Arc::new(PollLoop::new(file_id));
                    poll_loop.attach(listener.clone());
                    loops.insert(file_id.to_string(), poll_loop.clone());
                    (poll_loop, true)
                }
            }
        };

        if spawned {
            debug!("[文件 {}] 🔄 启动轮询 (间隔 {:?})", file_id, options.interval);
            tokio::spawn(run_loop(
                self.parse.clone(),
                self.loops.clone(),
                poll_loop.clone(),
                options.interval,
                options.max_consecutive_failures.max(1),
            ));
        } else if let Some(latest) = poll_loop.latest() {
            debug!("[文件 {}] 加入已有轮询，当前状态 {}", file_id, latest.status);
            listener.offer(&latest);
        }

        Subscription {
            listener,
            poll_loop,
        }
    }

    /// 取消所有订阅并停止所有循环
    pub fn cancel_all(&self) {
        let loops: Vec<Arc<PollLoop>> = lock(&self.loops).drain().map(|(_, l)| l).collect();
        if !loops.is_empty() {
            info!("🛑 停止 {} 个轮询", loops.len());
        }
        for poll_loop in loops {
            poll_loop.shutdown();
        }
    }

    /// 仍在运行的轮询循环数
    pub fn active_count(&self) -> usize {
        lock(&self.loops)
            .values()
            .filter(|l| !l.token.is_cancelled())
            .count()
    }
}

/// 查询失败是否值得继续轮询
fn is_retryable(err: &ClientError) -> bool {
    match err {
        ClientError::InvalidResponse { .. } | ClientError::Unsupported { .. } => true,
        ClientError::ServerRejected { status, .. } => {
            *status >= 500 || *status == 408 || *status == 429
        }
        other => other.is_transient(),
    }
}

async fn poll_once(
    parse: &ParseService,
    file_id: &str,
) -> ClientResult<(FileStatus, Option<String>)> {
    let response = parse.status(file_id).await?;
    Ok((response.file_status()?, response.message))
}

async fn run_loop(
    parse: Arc<ParseService>,
    registry: LoopRegistry,
    poll_loop: Arc<PollLoop>,
    interval: Duration,
    max_failures: u32,
) {
    let file_id = poll_loop.file_id.clone();
    let token = poll_loop.token.clone();
    let mut failures = 0u32;
    let mut delivered: Option<u8> = None;

    loop {
        if token.is_cancelled() {
            break;
        }

        let result = poll_once(&parse, &file_id).await;
        if token.is_cancelled() {
            debug!("[文件 {}] 订阅已取消，丢弃本次查询结果", file_id);
            break;
        }

        match result {
            Ok((status, message)) => {
                failures = 0;
                parse.board().record(&file_id, status);

                if delivered.map_or(true, |prev| status.rank() > prev) {
                    delivered = Some(status.rank());
                    debug!("[文件 {}] 状态 → {}", file_id, status);
                    poll_loop.deliver(ParseUpdate {
                        file_id: file_id.clone(),
                        status,
                        message,
                        unreachable: false,
                    });
                }

                if status.is_terminal() {
                    match status {
                        FileStatus::Parsed => info!("[文件 {}] ✅ 解析完成", file_id),
                        _ => warn!("[文件 {}] ❌ 解析失败", file_id),
                    }
                    break;
                }
            }
            Err(err) if is_retryable(&err) => {
                failures += 1;
                warn!(
                    "[文件 {}] ⚠️ 查询解析状态失败 ({}/{}): {}",
                    file_id, failures, max_failures, err
                );
                poll_loop.report(&err);

                if failures >= max_failures {
                    error!(
                        "[文件 {}] ❌ 连续 {} 次查询失败，放弃轮询",
                        file_id, failures
                    );
                    parse.board().record(&file_id, FileStatus::ParseFailed);
                    poll_loop.deliver(ParseUpdate {
                        file_id: file_id.clone(),
                        status: FileStatus::ParseFailed,
                        message: Some(err.user_message()),
                        unreachable: true,
                    });
                    break;
                }
            }
            Err(err) => {
                error!("[文件 {}] ❌ 服务端拒绝状态查询: {}", file_id, err);
                parse.board().record(&file_id, FileStatus::ParseFailed);
                poll_loop.deliver(ParseUpdate {
                    file_id: file_id.clone(),
                    status: FileStatus::ParseFailed,
                    message: Some(err.user_message()),
                    unreachable: false,
                });
                break;
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }

    poll_loop.finish();

    let mut loops = lock(&registry);
    if loops
        .get(&file_id)
        .map_or(false, |current| Arc::ptr_eq(current, &poll_loop))
    {
        loops.remove(&file_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use crate::workflow::StatusBoard;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    /// 按调用次数返回脚本化的状态，脚本用完后重复最后一项
    fn scripted(script: Vec<ClientResult<&'static str>>) -> Arc<FakeTransport> {
        let calls = AtomicUsize::new(0);
        FakeTransport::new(move |request| {
            let n = calls.fetch_add(1, Ordering::SeqCst).min(script.len() - 1);
            let file_id = request.path.split('/').nth(2).unwrap_or_default().to_string();
            match &script[n] {
                Ok(status) => Ok(json!({"file_id": file_id, "status": status})),
                Err(ClientError::Timeout { endpoint }) => Err(ClientError::Timeout {
                    endpoint: endpoint.clone(),
                }),
                Err(ClientError::ServerRejected { status, message, .. }) => {
                    Err(ClientError::ServerRejected {
                        status: *status,
                        message: message.clone(),
                        body: None,
                    })
                }
                Err(other) => panic!("unsupported script entry: {:?}", other),
            }
        })
        .into_arc()
    }

    fn timeout_err() -> ClientResult<&'static str> {
        Err(ClientError::Timeout {
            endpoint: "GET /files/1/parse/status".to_string(),
        })
    }

    fn poller(fake: Arc<FakeTransport>) -> ParsePoller {
        let board = Arc::new(StatusBoard::new());
        ParsePoller::new(Arc::new(ParseService::new(fake, board)))
    }

    fn fast() -> SubscribeOptions {
        SubscribeOptions {
            interval: Duration::from_millis(5),
            max_consecutive_failures: 3,
            on_error: None,
        }
    }

    fn collector() -> (UpdateFn, Arc<Mutex<Vec<ParseUpdate>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (Arc::new(move |u: ParseUpdate| sink.lock().unwrap().push(u)), seen)
    }

    fn statuses(seen: &Arc<Mutex<Vec<ParseUpdate>>>) -> Vec<FileStatus> {
        seen.lock().unwrap().iter().map(|u| u.status).collect()
    }

    async fn wait(subscription: &Subscription) {
        timeout(Duration::from_secs(2), subscription.finished())
            .await
            .expect("poll loop did not finish");
    }

    #[tokio::test]
    async fn test_runs_until_terminal() {
        let fake = scripted(vec![Ok("pending"), Ok("parsing"), Ok("parsing"), Ok("parsed")]);
        let poller = poller(fake.clone());
        let (on_update, seen) = collector();

        let subscription = poller.subscribe("1", on_update, fast());
        wait(&subscription).await;

        assert_eq!(
            statuses(&seen),
            vec![FileStatus::Pending, FileStatus::Parsing, FileStatus::Parsed]
        );
        assert_eq!(fake.call_count(), 4);
        assert_eq!(poller.parse.board().get("1"), Some(FileStatus::Parsed));

        // 终态后不再查询
        sleep(Duration::from_millis(30)).await;
        assert_eq!(fake.call_count(), 4);
    }

    #[tokio::test]
    async fn test_regressing_status_is_not_delivered() {
        let fake = scripted(vec![Ok("parsing"), Ok("pending"), Ok("parsing"), Ok("parse_failed")]);
        let poller = poller(fake);
        let (on_update, seen) = collector();

        let subscription = poller.subscribe("1", on_update, fast());
        wait(&subscription).await;

        assert_eq!(
            statuses(&seen),
            vec![FileStatus::Parsing, FileStatus::ParseFailed]
        );
    }

    #[tokio::test]
    async fn test_transient_errors_do_not_end_subscription() {
        let fake = scripted(vec![timeout_err(), timeout_err(), Ok("parsed")]);
        let poller = poller(fake.clone());
        let (on_update, seen) = collector();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();

        let options = fast().on_error(Arc::new(move |file_id: &str, err: &ClientError| {
            assert_eq!(file_id, "1");
            assert!(err.is_transient());
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let subscription = poller.subscribe("1", on_update, options);
        wait(&subscription).await;

        assert_eq!(errors.load(Ordering::SeqCst), 2);
        assert_eq!(statuses(&seen), vec![FileStatus::Parsed]);
        assert!(!seen.lock().unwrap()[0].unreachable);
    }

    #[tokio::test]
    async fn test_gives_up_after_consecutive_failures() {
        let fake = scripted(vec![Ok("parsing"), timeout_err()]);
        let poller = poller(fake.clone());
        let (on_update, seen) = collector();

        let subscription = poller.subscribe("1", on_update, fast());
        wait(&subscription).await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].status, FileStatus::ParseFailed);
        assert!(seen[1].unreachable);
        assert_eq!(seen[1].message.as_deref(), Some("请求超时，请稍后重试"));
        assert_eq!(fake.call_count(), 4);
    }

    #[tokio::test]
    async fn test_rejected_query_is_terminal() {
        let fake = scripted(vec![Err(ClientError::ServerRejected {
            status: 404,
            message: "文件不存在".to_string(),
            body: None,
        })]);
        let poller = poller(fake.clone());
        let (on_update, seen) = collector();

        let subscription = poller.subscribe("1", on_update, fast());
        wait(&subscription).await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].status, FileStatus::ParseFailed);
        assert!(!seen[0].unreachable);
        assert_eq!(seen[0].message.as_deref(), Some("文件不存在"));
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_status_counts_as_failure() {
        let fake = scripted(vec![Ok("queued"), Ok("parsed")]);
        let poller = poller(fake);
        let (on_update, seen) = collector();

        let subscription = poller.subscribe("1", on_update, fast());
        wait(&subscription).await;

        assert_eq!(statuses(&seen), vec![FileStatus::Parsed]);
    }

    #[tokio::test]
    async fn test_cancel_stops_updates_and_queries() {
        let fake = scripted(vec![Ok("pending"), Ok("parsing")]);
        let poller = poller(fake.clone());
        let (on_update, seen) = collector();

        let subscription = poller.subscribe("1", on_update, fast());
        sleep(Duration::from_millis(30)).await;
        subscription.cancel();
        subscription.cancel();
        assert!(subscription.is_cancelled());
        wait(&subscription).await;

        let delivered = seen.lock().unwrap().len();
        let queried = fake.call_count();
        sleep(Duration::from_millis(30)).await;

        assert_eq!(seen.lock().unwrap().len(), delivered);
        assert_eq!(fake.call_count(), queried);
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_share_one_loop() {
        let fake = scripted(vec![Ok("pending"), Ok("parsing"), Ok("parsing"), Ok("parsed")]);
        let poller = poller(fake.clone());
        let (first_update, first) = collector();
        let (second_update, second) = collector();

        let a = poller.subscribe("7", first_update, fast());
        let b = poller.subscribe("7", second_update, fast());
        assert_eq!(poller.active_count(), 1);
        wait(&a).await;
        wait(&b).await;

        assert_eq!(fake.call_count(), 4);
        assert_eq!(statuses(&first).last(), Some(&FileStatus::Parsed));
        assert_eq!(statuses(&second).last(), Some(&FileStatus::Parsed));
    }

    #[tokio::test]
    async fn test_cancelling_one_subscriber_keeps_the_other() {
        let fake = scripted(vec![Ok("parsing"), Ok("parsing"), Ok("parsing"), Ok("parsed")]);
        let poller = poller(fake);
        let (first_update, first) = collector();
        let (second_update, second) = collector();

        let a = poller.subscribe("7", first_update, fast());
        let b = poller.subscribe("7", second_update, fast());
        a.cancel();
        wait(&b).await;

        assert!(!statuses(&first).contains(&FileStatus::Parsed));
        assert_eq!(statuses(&second).last(), Some(&FileStatus::Parsed));
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let fake = scripted(vec![Ok("parsing")]);
        let poller = poller(fake);
        let (u1, _) = collector();
        let (u2, _) = collector();

        let a = poller.subscribe("1", u1, fast());
        let b = poller.subscribe("2", u2, fast());
        poller.cancel_all();

        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        wait(&a).await;
        wait(&b).await;
        assert_eq!(poller.active_count(), 0);
    }
}
