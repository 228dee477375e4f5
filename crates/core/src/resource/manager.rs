use std::{collections::HashSet, mem, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::{
    error::{ApiError, ManagerError},
    models::{Card, CardDraft, CardForm, CardId},
};

use super::client::CardApi;

/// Which card the dialog is working on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogMode {
    /// Drafting a card that does not exist on the server yet.
    Creating,
    /// Editing the listed card with this id.
    Editing(CardId),
}

/// The single create/edit dialog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Dialog {
    /// Not visible.
    #[default]
    Closed,
    /// Visible and accepting edits.
    Open {
        /// Create or edit.
        mode: DialogMode,
        /// Working copy.
        draft: CardDraft,
    },
    /// Visible while the create/update request is in flight.
    Saving {
        /// Create or edit.
        mode: DialogMode,
        /// Working copy as submitted.
        draft: CardDraft,
    },
}

impl Dialog {
    /// Whether the dialog is on screen.
    pub fn is_visible(&self) -> bool {
        !matches!(self, Dialog::Closed)
    }

    /// Whether a save request is in flight.
    pub fn is_saving(&self) -> bool {
        matches!(self, Dialog::Saving { .. })
    }

    /// Current mode, if visible.
    pub fn mode(&self) -> Option<&DialogMode> {
        match self {
            Dialog::Closed => None,
            Dialog::Open { mode, .. } | Dialog::Saving { mode, .. } => Some(mode),
        }
    }

    /// Current draft, if visible.
    pub fn draft(&self) -> Option<&CardDraft> {
        match self {
            Dialog::Closed => None,
            Dialog::Open { draft, .. } | Dialog::Saving { draft, .. } => Some(draft),
        }
    }
}

/// Create or update call prepared from a validated draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveRequest {
    /// `POST /api/cards`.
    Create(CardForm),
    /// `PUT /api/cards/{id}`.
    Update(CardId, CardForm),
}

impl SaveRequest {
    /// Issue the request.
    pub async fn execute(&self, api: &dyn CardApi) -> Result<(), ApiError> {
        match self {
            SaveRequest::Create(form) => api.create(form).await,
            SaveRequest::Update(id, form) => api.update(id, form).await,
        }
    }
}

/// Delete call for a single card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    /// Card to remove.
    pub id: CardId,
}

impl DeleteRequest {
    /// Issue the request.
    pub async fn execute(&self, api: &dyn CardApi) -> Result<(), ApiError> {
        api.delete(&self.id).await
    }
}

/// Owns the card list and the edit dialog, keeping both in step with the API.
///
/// The list is only ever replaced by a successful fetch. Every mutation that
/// succeeds is followed by a fresh listing rather than a local patch.
///
/// The `begin_*`/`finish_*` pairs let an event loop run the request on its own
/// task; the async one-shot methods compose them for callers that can simply
/// await.
pub struct ResourceManager {
    api: Arc<dyn CardApi>,
    cards: Vec<Card>,
    synced_at: Option<DateTime<Utc>>,
    dialog: Dialog,
    deleting: HashSet<CardId>,
    last_error: Option<String>,
}

impl ResourceManager {
    /// Manager backed by `api`, starting with an empty list.
    pub fn new(api: Arc<dyn CardApi>) -> Self {
        Self {
            api,
            cards: Vec::new(),
            synced_at: None,
            dialog: Dialog::Closed,
            deleting: HashSet::new(),
            last_error: None,
        }
    }

    /// Shared handle to the API client.
    pub fn api(&self) -> Arc<dyn CardApi> {
        Arc::clone(&self.api)
    }

    /// Cards from the last successful fetch.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Look up a listed card.
    pub fn card(&self, id: &CardId) -> Option<&Card> {
        self.cards.iter().find(|card| &card.id == id)
    }

    /// Time of the last successful fetch.
    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    /// Current dialog state.
    pub fn dialog(&self) -> &Dialog {
        &self.dialog
    }

    /// Message of the most recent failure.
    ///
    /// Cleared by the next success, by opening the dialog and by editing the draft.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a delete for `id` is in flight.
    pub fn is_deleting(&self, id: &CardId) -> bool {
        self.deleting.contains(id)
    }

    /// Fetch the card list and replace the local copy.
    pub async fn refresh(&mut self) -> Result<(), ManagerError> {
        let result = self.api.list().await;
        self.apply_listing(result)
    }

    /// Apply the outcome of a list request. Failures keep the previous list.
    pub fn apply_listing(
        &mut self,
        result: Result<Vec<Card>, ApiError>,
    ) -> Result<(), ManagerError> {
        match result {
            Ok(cards) => {
                info!(total = cards.len(), "Cards refreshed");
                self.cards = cards;
                self.synced_at = Some(Utc::now());
                self.last_error = None;
                Ok(())
            }
            Err(err) => Err(self.report("fetch cards", err.into())),
        }
    }

    /// Open the dialog with an empty draft.
    pub fn open_create(&mut self) -> Result<(), ManagerError> {
        self.ensure_not_saving()?;
        self.last_error = None;
        self.dialog = Dialog::Open {
            mode: DialogMode::Creating,
            draft: CardDraft::default(),
        };
        Ok(())
    }

    /// Open the dialog on a copy of `card`.
    pub fn open_edit(&mut self, card: &Card) -> Result<(), ManagerError> {
        self.ensure_not_saving()?;
        self.last_error = None;
        self.dialog = Dialog::Open {
            mode: DialogMode::Editing(card.id.clone()),
            draft: CardDraft::from(card),
        };
        Ok(())
    }

    /// Open the dialog on the listed card with `id`.
    pub fn open_edit_by_id(&mut self, id: &CardId) -> Result<(), ManagerError> {
        let card = self
            .card(id)
            .cloned()
            .ok_or_else(|| ManagerError::UnknownCard(id.clone()))?;
        self.open_edit(&card)
    }

    /// Mutable access to the draft while the dialog accepts edits.
    pub fn draft_mut(&mut self) -> Result<&mut CardDraft, ManagerError> {
        match &mut self.dialog {
            Dialog::Open { draft, .. } => {
                self.last_error = None;
                Ok(draft)
            }
            Dialog::Saving { .. } => Err(ManagerError::SaveInFlight),
            Dialog::Closed => Err(ManagerError::NoDraft),
        }
    }

    /// Discard the draft and close the dialog.
    pub fn cancel(&mut self) -> Result<(), ManagerError> {
        self.ensure_not_saving()?;
        self.dialog = Dialog::Closed;
        Ok(())
    }

    /// Validate the draft and move the dialog into the saving state.
    ///
    /// Validation failures are reported and leave the dialog open; no request
    /// is produced.
    pub fn begin_save(&mut self) -> Result<SaveRequest, ManagerError> {
        let (mode, draft) = match &self.dialog {
            Dialog::Open { mode, draft } => (mode.clone(), draft.clone()),
            Dialog::Saving { .. } => return Err(ManagerError::SaveInFlight),
            Dialog::Closed => return Err(ManagerError::NoDraft),
        };

        let form = match draft.to_form() {
            Ok(form) => form,
            Err(err) => return Err(self.report("save card", err.into())),
        };

        let request = match &mode {
            DialogMode::Creating => SaveRequest::Create(form),
            DialogMode::Editing(id) => SaveRequest::Update(id.clone(), form),
        };
        self.dialog = Dialog::Saving { mode, draft };
        Ok(request)
    }

    /// Apply the outcome of a save request.
    ///
    /// Success closes the dialog; the caller follows up with a fresh listing.
    /// Failure reopens the dialog with the submitted draft.
    pub fn finish_save(&mut self, result: Result<(), ApiError>) -> Result<(), ManagerError> {
        let (mode, draft) = match mem::take(&mut self.dialog) {
            Dialog::Saving { mode, draft } => (mode, draft),
            other => {
                self.dialog = other;
                return Err(ManagerError::NoDraft);
            }
        };

        match result {
            Ok(()) => {
                match &mode {
                    DialogMode::Creating => info!(name = %draft.name, "Card created"),
                    DialogMode::Editing(id) => info!(%id, name = %draft.name, "Card updated"),
                }
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                self.dialog = Dialog::Open { mode, draft };
                Err(self.report("save card", err.into()))
            }
        }
    }

    /// Save the draft, then re-fetch the list.
    pub async fn save(&mut self) -> Result<(), ManagerError> {
        let request = self.begin_save()?;
        let api = self.api();
        let result = request.execute(api.as_ref()).await;
        self.finish_save(result)?;
        self.refresh().await
    }

    /// Register a delete for `id`, refusing a second one while the first is in flight.
    pub fn begin_delete(&mut self, id: &CardId) -> Result<DeleteRequest, ManagerError> {
        if !self.deleting.insert(id.clone()) {
            return Err(ManagerError::DeleteInFlight(id.clone()));
        }
        Ok(DeleteRequest { id: id.clone() })
    }

    /// Apply the outcome of a delete request. The list is never patched locally.
    pub fn finish_delete(
        &mut self,
        id: &CardId,
        result: Result<(), ApiError>,
    ) -> Result<(), ManagerError> {
        self.deleting.remove(id);
        match result {
            Ok(()) => {
                info!(%id, "Card deleted");
                self.last_error = None;
                Ok(())
            }
            Err(err) => Err(self.report("delete card", err.into())),
        }
    }

    /// Delete the card with `id`, then re-fetch the list.
    pub async fn delete(&mut self, id: &CardId) -> Result<(), ManagerError> {
        let request = self.begin_delete(id)?;
        let api = self.api();
        let result = request.execute(api.as_ref()).await;
        self.finish_delete(id, result)?;
        self.refresh().await
    }

    fn ensure_not_saving(&self) -> Result<(), ManagerError> {
        if self.dialog.is_saving() {
            return Err(ManagerError::SaveInFlight);
        }
        Ok(())
    }

    fn report(&mut self, action: &str, err: ManagerError) -> ManagerError {
        error!("Failed to {action}: {err}");
        self.last_error = Some(format!("Failed to {action}: {err}"));
        err
    }
}
