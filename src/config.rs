use crate::error::{MatchError, MatchResult};
use serde::{Deserialize, Serialize};

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 停机时导出审计 CSV 的路径 (未设置则不导出)
    pub audit_export_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            audit_export_path: None,
        }
    }
}

/// 匹配阈值配置 (分数区间均为 [0, 1])
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// 分数 >= 该值 → Exact
    pub exact_threshold: f64,
    /// 分数 >= 该值 → Strong
    pub strong_threshold: f64,
    /// 分数 >= 该值 → Weak；低于该值不生成提案
    pub weak_threshold: f64,
    /// 第一、第二候选分差小于该值 → Ambiguous
    pub ambiguity_epsilon: f64,
    /// 每张凭证保留的候选数量
    pub top_k: usize,
    pub weights: ScoreWeights,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            exact_threshold: 0.95,
            strong_threshold: 0.75,
            weak_threshold: 0.50,
            ambiguity_epsilon: 0.05,
            top_k: 5,
            weights: ScoreWeights::default(),
        }
    }
}

/// 评分权重 (按权重和归一化)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub amount: f64,
    pub reference: f64,
    pub counterparty: f64,
    pub date: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            amount: 0.35,
            reference: 0.25,
            counterparty: 0.25,
            date: 0.15,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.amount + self.reference + self.counterparty + self.date
    }
}

impl MatchingConfig {
    /// 校验阈值顺序与权重
    pub fn validate(&self) -> MatchResult<()> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_unit(self.weak_threshold)
            && in_unit(self.strong_threshold)
            && in_unit(self.exact_threshold))
        {
            return Err(MatchError::Config(
                "thresholds must lie within [0, 1]".to_string(),
            ));
        }
        if !(self.weak_threshold <= self.strong_threshold
            && self.strong_threshold <= self.exact_threshold)
        {
            return Err(MatchError::Config(format!(
                "thresholds must satisfy weak <= strong <= exact (got {} / {} / {})",
                self.weak_threshold, self.strong_threshold, self.exact_threshold
            )));
        }
        if !(self.ambiguity_epsilon >= 0.0) {
            return Err(MatchError::Config(
                "ambiguity_epsilon must be non-negative".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(MatchError::Config("top_k must be at least 1".to_string()));
        }
        let w = &self.weights;
        if [w.amount, w.reference, w.counterparty, w.date]
            .iter()
            .any(|v| !(*v >= 0.0))
            || w.total() <= 0.0
        {
            return Err(MatchError::Config(
                "score weights must be non-negative with a positive sum".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// 从环境变量加载配置 (配置文件路径取自 MATCHER_CONFIG)
    pub fn from_env() -> MatchResult<Self> {
        let path = std::env::var("MATCHER_CONFIG").unwrap_or_else(|_| "matcher.toml".to_string());
        Self::load(&path)
    }

    /// 配置文件 (可选) + MATCHER__ 前缀环境变量，后者优先
    pub fn load(path: &str) -> MatchResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("MATCHER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.matching.validate()?;
        Ok(config)
    }
}
