use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder, Response,
};
use tracing::{debug, warn};

use crate::{
    error::ApiError,
    models::{Card, CardForm, CardId},
    session::SessionProvider,
};

/// Remote card catalog.
#[async_trait]
pub trait CardApi: Send + Sync {
    /// Fetch the full card collection.
    async fn list(&self) -> Result<Vec<Card>, ApiError>;

    /// Create a new card.
    async fn create(&self, form: &CardForm) -> Result<(), ApiError>;

    /// Update an existing card, replacing its image when one is attached.
    async fn update(&self, id: &CardId, form: &CardForm) -> Result<(), ApiError>;

    /// Remove a card.
    async fn delete(&self, id: &CardId) -> Result<(), ApiError>;
}

/// [`CardApi`] over HTTP with multipart uploads.
#[derive(Clone)]
pub struct HttpCardApi {
    client: Client,
    base_url: String,
    session: Option<Arc<dyn SessionProvider>>,
}

impl HttpCardApi {
    /// Client for the API rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
        }
    }

    /// Attach the session token, when present, as a bearer credential.
    pub fn with_session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    fn collection_url(&self) -> String {
        format!("{}/api/cards", self.base_url)
    }

    fn card_url(&self, id: &CardId) -> String {
        format!("{}/api/cards/{}", self.base_url, id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.as_ref().and_then(|session| session.token()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status { status, body })
    }
}

fn multipart(form: &CardForm) -> Result<Form, ApiError> {
    let mut multipart = Form::new()
        .text("name", form.name.clone())
        .text("description", form.description.clone())
        .text("upgradeCost", form.upgrade_cost.to_string());
    if let Some(image) = &form.image {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)?;
        multipart = multipart.part("image", part);
    }
    Ok(multipart)
}

/// Keep every record that decodes; one malformed entry does not hide the rest.
fn decode_cards(records: Vec<serde_json::Value>) -> Vec<Card> {
    let total = records.len();
    let cards: Vec<Card> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(card) => Some(card),
            Err(err) => {
                warn!(index, %err, "Skipping malformed card record");
                None
            }
        })
        .collect();
    if cards.len() < total {
        warn!(total, kept = cards.len(), "Card listing had malformed records");
    }
    cards
}

#[async_trait]
impl CardApi for HttpCardApi {
    async fn list(&self) -> Result<Vec<Card>, ApiError> {
        let url = self.collection_url();
        debug!(%url, "GET cards");
        let response = self.send(self.client.get(&url)).await?;
        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let records: Option<Vec<serde_json::Value>> = serde_json::from_slice(&body)?;
        Ok(decode_cards(records.unwrap_or_default()))
    }

    async fn create(&self, form: &CardForm) -> Result<(), ApiError> {
        let url = self.collection_url();
        debug!(%url, name = %form.name, "POST card");
        self.send(self.client.post(&url).multipart(multipart(form)?))
            .await?;
        Ok(())
    }

    async fn update(&self, id: &CardId, form: &CardForm) -> Result<(), ApiError> {
        let url = self.card_url(id);
        debug!(%url, name = %form.name, "PUT card");
        self.send(self.client.put(&url).multipart(multipart(form)?))
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &CardId) -> Result<(), ApiError> {
        let url = self.card_url(id);
        debug!(%url, "DELETE card");
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::ImageAttachment, session::MemorySessionStore};
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn form(image: Option<ImageAttachment>) -> CardForm {
        CardForm {
            name: "Fireball".to_string(),
            description: "Deals damage".to_string(),
            upgrade_cost: 100,
            image,
        }
    }

    async fn only_body(server: &MockServer) -> String {
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        String::from_utf8_lossy(&requests[0].body).to_string()
    }

    #[tokio::test]
    async fn lists_cards() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cards"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "name": "Fireball", "description": "Deals damage", "upgradeCost": 100}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let cards = HttpCardApi::new(server.uri()).list().await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, CardId::new("1"));
        assert_eq!(cards[0].name, "Fireball");
    }

    #[tokio::test]
    async fn null_or_empty_listing_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cards"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;
        assert!(HttpCardApi::new(server.uri()).list().await.unwrap().is_empty());

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cards"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        assert!(HttpCardApi::new(server.uri()).list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cards"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        match HttpCardApi::new(server.uri()).list().await {
            Err(ApiError::Status { status, body }) => {
                assert_eq!(status.as_u16(), 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_listing_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cards"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"cards\": 3}"))
            .mount(&server)
            .await;

        let result = HttpCardApi::new(server.uri()).list().await;
        assert!(matches!(result, Err(ApiError::Decode(_))));
    }

    #[tokio::test]
    async fn malformed_records_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cards"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"_id": "abc", "name": "Orphan"},
                {"id": 2, "name": "Shield", "description": "Blocks", "upgradeCost": 50},
                3
            ])))
            .mount(&server)
            .await;

        let cards = HttpCardApi::new(server.uri()).list().await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, CardId::new("2"));
        assert_eq!(cards[0].name, "Shield");
    }

    #[tokio::test]
    async fn create_posts_multipart_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/cards"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        HttpCardApi::new(server.uri())
            .create(&form(None))
            .await
            .unwrap();

        let body = only_body(&server).await;
        assert!(body.contains("name=\"name\""));
        assert!(body.contains("Fireball"));
        assert!(body.contains("name=\"description\""));
        assert!(body.contains("name=\"upgradeCost\""));
        assert!(body.contains("100"));
        assert!(!body.contains("name=\"image\""));
    }

    #[tokio::test]
    async fn update_puts_image_part() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/cards/42"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let image = ImageAttachment::new("shield.png", b"PNGDATA".to_vec());
        HttpCardApi::new(server.uri())
            .update(&CardId::new("42"), &form(Some(image)))
            .await
            .unwrap();

        let body = only_body(&server).await;
        assert!(body.contains("name=\"image\"; filename=\"shield.png\""));
        assert!(body.contains("image/png"));
        assert!(body.contains("PNGDATA"));
    }

    #[tokio::test]
    async fn delete_sends_bearer_token_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/cards/7"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpCardApi::new(format!("{}/", server.uri()))
            .with_session(Arc::new(MemorySessionStore::with_token("secret")));
        api.delete(&CardId::new("7")).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = HttpCardApi::new(uri).delete(&CardId::new("1")).await;
        assert!(matches!(result, Err(ApiError::Transport(_))));
    }
}
