use thiserror::Error;

/// 匹配引擎错误
#[derive(Debug, Error)]
pub enum MatchError {
    /// 候选发票为空或付款金额非正，搜索开始前即返回
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 服务层错误 (对账驱动 / 数据库 / 阻塞任务)
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ServiceError {
    /// 是否为调用方参数错误 (HTTP 400)
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, ServiceError::Match(MatchError::InvalidArgument(_)))
    }
}
