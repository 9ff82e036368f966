pub mod metrics;
pub(crate) mod structured_log;
pub(crate) mod tracing;

use std::sync::Arc;

use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};

use self::metrics::Metrics;

/// Telemetry（メトリクスとトレーシング）を管理する構造体。
///
/// トレーシングの初期化はプロセスで一度だけ行われ、ログ出力の
/// 有効/無効やレベルはサブスクライバ側で一元的に判定されます。
/// 各コンポーネントはtracingイベントを発行するだけで、フラグの
/// 再チェックは行いません。
#[derive(Debug, Clone)]
pub struct Telemetry {
    metrics: Arc<Metrics>,
}

impl Telemetry {
    /// 新しいTelemetryインスタンスを作成し、トレーシングとメトリクスを初期化する。
    ///
    /// # Errors
    /// サブスクライバまたはメトリクスレジストリの初期化に失敗した場合はエラーを返す。
    pub fn new(otel_endpoint: Option<&str>, otel_sampling_ratio: f64) -> Result<Self> {
        tracing::init(otel_endpoint, otel_sampling_ratio)?;
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new(&registry)?);
        Ok(Self { metrics })
    }

    /// メトリクスへの共有参照を返す。
    #[must_use]
    pub fn metrics_arc(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// 準備完了プローブを記録する。
    pub fn record_ready_probe(&self) {
        ::tracing::debug!("service ready probe");
    }

    /// ライブプローブを記録する。
    pub fn record_live_probe(&self) {
        ::tracing::debug!("service live probe");
    }

    /// Prometheusメトリクスをレンダリングする。
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        String::from_utf8(buffer).unwrap_or_default()
    }
}
