use tower_lsp::Client;
use tower_lsp::lsp_types::notification;
use tower_lsp::lsp_types::*;

/// 作業進捗の通知（begin → report → end）
pub struct Progress<'a> {
    client: &'a Client,
    token: NumberOrString,
}

impl<'a> Progress<'a> {
    /// トークンを作成してbeginを送る
    pub async fn begin(client: &'a Client, token_name: &str, title: &str, message: Option<String>) -> Self {
        let token = NumberOrString::String(token_name.to_string());
        let _ = client
            .send_request::<request::WorkDoneProgressCreate>(WorkDoneProgressCreateParams {
                token: token.clone(),
            })
            .await;

        let progress = Self { client, token };
        progress
            .send(WorkDoneProgress::Begin(WorkDoneProgressBegin {
                title: title.to_string(),
                cancellable: Some(false),
                message,
                percentage: Some(0),
            }))
            .await;
        progress
    }

    pub async fn report(&self, message: String, percentage: u32) {
        self.send(WorkDoneProgress::Report(WorkDoneProgressReport {
            cancellable: Some(false),
            message: Some(message),
            percentage: Some(percentage.min(100)),
        }))
        .await;
    }

    pub async fn end(self, message: String) {
        self.send(WorkDoneProgress::End(WorkDoneProgressEnd {
            message: Some(message),
        }))
        .await;
    }

    async fn send(&self, value: WorkDoneProgress) {
        self.client
            .send_notification::<notification::Progress>(ProgressParams {
                token: self.token.clone(),
                value: ProgressParamsValue::WorkDone(value),
            })
            .await;
    }
}
