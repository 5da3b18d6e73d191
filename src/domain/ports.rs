use crate::domain::model::{
    BookingConfirmation, Candidate, HttpMethod, Location, MessageRef, ProbeReport, RawResponse,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 對排程 API 送出請求，只負責傳輸不解讀內容，也不重試
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&serde_json::Value>,
    ) -> Result<RawResponse>;
}

/// 通知頻道後端
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// 能否原地編輯已送出的訊息
    fn supports_edit(&self) -> bool;

    /// 送出新訊息；可編輯的後端回傳訊息參照
    async fn send(&self, text: &str, silent: bool) -> Result<Option<MessageRef>>;

    async fn edit(&self, message: MessageRef, text: &str) -> Result<()>;
}

#[async_trait]
pub trait LocationProbe: Send + Sync {
    async fn probe(&self, location: &Location) -> Result<ProbeReport>;
}

/// 接手探測到的候選時段
///
/// `Ok(Some(_))` 代表預約完成（終止狀態），`Ok(None)` 代表繼續輪詢，
/// `Err` 只用於必須結束程序的致命錯誤。
#[async_trait]
pub trait CandidateHandler: Send + Sync {
    async fn on_candidate(&self, candidate: Candidate) -> Result<Option<BookingConfirmation>>;
}
