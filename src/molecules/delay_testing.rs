// 节点延迟测试
//
// 通过 Clash API 测试代理节点延迟，测试地址取自应用偏好设置

use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use crate::atoms::ControllerApi;

pub const DEFAULT_TIMEOUT_MS: u32 = 5000;
pub const DEFAULT_CONCURRENCY: usize = 8;

// 核心繁忙（503/504）时的最大重试次数
const MAX_BUSY_RETRIES: u32 = 5;

// 单个节点的测试结果，None 表示失败或超时
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayResult {
    pub proxy_name: String,
    pub delay_ms: Option<u32>,
}

impl DelayResult {
    pub fn is_successful(&self) -> bool {
        self.delay_ms.is_some()
    }
}

pub type ProgressCallback = Arc<dyn Fn(&DelayResult) + Send + Sync>;

pub struct DelayTester {
    api: Arc<dyn ControllerApi>,
    test_url: String,
    timeout_ms: u32,
    concurrency: usize,
}

impl DelayTester {
    pub fn new(api: Arc<dyn ControllerApi>, test_url: impl Into<String>) -> Self {
        Self {
            api,
            test_url: test_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    // 测试单个节点延迟
    pub async fn test_single(&self, proxy_name: &str) -> DelayResult {
        let delay_ms = test_single_node(
            self.api.as_ref(),
            proxy_name,
            &self.test_url,
            self.timeout_ms,
        )
        .await;

        DelayResult {
            proxy_name: proxy_name.to_string(),
            delay_ms,
        }
    }

    // 批量延迟测试（并发受限的滑动窗口），每完成一个节点触发一次进度回调。
    // 结果按完成顺序返回。
    pub async fn test_batch(
        &self,
        proxy_names: Vec<String>,
        on_progress: ProgressCallback,
    ) -> Vec<DelayResult> {
        if proxy_names.is_empty() {
            log::warn!("批量延迟测试：节点列表为空");
            return Vec::new();
        }

        let total = proxy_names.len();
        log::info!(
            "开始批量延迟测试，节点数：{}，并发数：{}",
            total,
            self.concurrency
        );

        let results: Vec<DelayResult> = stream::iter(proxy_names.into_iter().enumerate())
            .map(|(index, proxy_name)| {
                let on_progress = Arc::clone(&on_progress);

                async move {
                    log::debug!("开始测试节点 ({}/{}): {}", index + 1, total, proxy_name);
                    let result = self.test_single(&proxy_name).await;
                    on_progress(&result);
                    result
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let success_count = results.iter().filter(|r| r.is_successful()).count();
        log::info!("批量延迟测试完成，成功：{}/{}", success_count, total);

        results
    }
}

// GET /proxies/{name}/delay，核心繁忙时线性退避重试
async fn test_single_node(
    api: &dyn ControllerApi,
    proxy_name: &str,
    test_url: &str,
    timeout_ms: u32,
) -> Option<u32> {
    let mut busy_retry_count = 0;

    loop {
        match api.proxy_delay(proxy_name, test_url, timeout_ms).await {
            // 核心以 0 表示超时
            Ok(0) => {
                log::warn!("节点延迟测试失败：{} - 超时", proxy_name);
                return None;
            }
            Ok(delay) => {
                log::info!("节点延迟测试成功：{} - {}ms", proxy_name, delay);
                return Some(delay);
            }
            Err(e) if e.is_busy() && busy_retry_count < MAX_BUSY_RETRIES => {
                busy_retry_count += 1;
                tokio::time::sleep(Duration::from_millis(80 * u64::from(busy_retry_count))).await;
            }
            Err(e) => {
                log::warn!("节点延迟测试请求失败：{} - {}", proxy_name, e);
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_single_success_and_failure() {
        let api = Arc::new(
            MockApi::new()
                .with_delays("HK-01", vec![Ok(123)])
                .with_delays("JP-01", vec![Ok(0)]),
        );
        let tester = DelayTester::new(api, "http://www.gstatic.com/generate_204");

        assert_eq!(tester.test_single("HK-01").await.delay_ms, Some(123));
        assert_eq!(tester.test_single("JP-01").await.delay_ms, None);
        // 未配置的节点返回 404
        assert_eq!(tester.test_single("US-01").await.delay_ms, None);
    }

    #[tokio::test]
    async fn test_busy_core_is_retried() {
        let api = Arc::new(MockApi::new().with_delays("SG-01", vec![Err(503), Err(504), Ok(88)]));
        let tester = DelayTester::new(api.clone(), "http://www.gstatic.com/generate_204");

        assert_eq!(tester.test_single("SG-01").await.delay_ms, Some(88));
        assert_eq!(api.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_limit() {
        let api = Arc::new(MockApi::new().with_delays("SG-01", vec![Err(503); 7]));
        let tester = DelayTester::new(api.clone(), "http://www.gstatic.com/generate_204");

        assert_eq!(tester.test_single("SG-01").await.delay_ms, None);
        assert_eq!(api.calls().len(), 1 + MAX_BUSY_RETRIES as usize);
    }

    #[tokio::test]
    async fn test_batch_reports_progress() {
        let api = Arc::new(
            MockApi::new()
                .with_delays("a", vec![Ok(10)])
                .with_delays("b", vec![Err(500)])
                .with_delays("c", vec![Ok(30)]),
        );
        let tester =
            DelayTester::new(api, "http://www.gstatic.com/generate_204").with_concurrency(2);

        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&progress);
        let mut results = tester
            .test_batch(
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                Arc::new(move |r: &DelayResult| sink.lock().unwrap().push(r.proxy_name.clone())),
            )
            .await;

        results.sort_by(|x, y| x.proxy_name.cmp(&y.proxy_name));
        assert_eq!(
            results.iter().map(|r| r.delay_ms).collect::<Vec<_>>(),
            vec![Some(10), None, Some(30)]
        );
        assert_eq!(progress.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let tester = DelayTester::new(Arc::new(MockApi::new()), "http://example.com");
        assert!(tester.test_batch(Vec::new(), Arc::new(|_: &DelayResult| {})).await.is_empty());
    }
}
