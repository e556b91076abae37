//! Per-session application state: the form draft, the last generation
//! result, and the current view selection. All mutation goes through the
//! named transition methods.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{FunnelContent, FunnelStage, GenerationRequest, HistoryEntry, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputView {
    #[default]
    Pages,
    AdCreative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageDisplayMode {
    #[default]
    Preview,
    Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSelection {
    pub output_view: OutputView,
    pub selected_stage: FunnelStage,
    pub display_mode: PageDisplayMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Generating,
    Ready,
    Failed {
        message: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("a generation is already in flight for this session")]
    GenerationInFlight,
    #[error("no generated page exists for that stage")]
    UnknownPage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub form: GenerationRequest,
    pub status: GenerationStatus,
    pub result: Option<FunnelContent>,
    /// History entry the current result was saved as or loaded from.
    pub active_history_id: Option<Uuid>,
    pub view: ViewSelection,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            form: GenerationRequest::default(),
            status: GenerationStatus::Idle,
            result: None,
            active_history_id: None,
            view: ViewSelection::default(),
        }
    }

    /// Enters the loading state, clearing any prior result and error. At most
    /// one generation is in flight per session.
    pub fn begin_generation(&mut self) -> Result<(), TransitionError> {
        if self.status == GenerationStatus::Generating {
            return Err(TransitionError::GenerationInFlight);
        }
        self.status = GenerationStatus::Generating;
        self.result = None;
        self.active_history_id = None;
        Ok(())
    }

    /// Stores a successful result and resets the view to the first stage's
    /// page preview.
    pub fn complete_generation(&mut self, content: FunnelContent, history_id: Uuid) {
        self.status = GenerationStatus::Ready;
        self.result = Some(content);
        self.active_history_id = Some(history_id);
        self.view = ViewSelection::default();
    }

    /// Records the failure message; any partial result stays cleared.
    pub fn fail_generation(&mut self, message: String) {
        self.status = GenerationStatus::Failed { message };
        self.result = None;
        self.active_history_id = None;
    }

    /// Rewrites one stage's in-memory HTML. History is untouched until an
    /// explicit save.
    pub fn edit_page(&mut self, stage: FunnelStage, html_content: String) -> Result<(), TransitionError> {
        let page = self
            .result
            .as_mut()
            .and_then(|r| r.pages.get_mut(&stage))
            .ok_or(TransitionError::UnknownPage)?;
        page.html_content = html_content;
        Ok(())
    }

    /// Copies a history entry's content into the session and makes it the
    /// active entry.
    pub fn load_entry(&mut self, entry: &HistoryEntry) {
        self.status = GenerationStatus::Ready;
        self.result = Some(FunnelContent {
            pages: entry.pages.clone(),
            ad_creative: entry.ad_creative.clone(),
        });
        self.active_history_id = Some(entry.id);
        self.view = ViewSelection::default();
    }

    pub fn page(&self, stage: FunnelStage) -> Option<&Page> {
        self.result.as_ref().and_then(|r| r.pages.get(&stage))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdCreative, Page};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn content() -> FunnelContent {
        let mut pages = BTreeMap::new();
        for stage in FunnelStage::ALL {
            pages.insert(
                stage,
                Page {
                    stage,
                    html_content: format!("<h1>{}</h1>", stage.key()),
                },
            );
        }
        FunnelContent {
            pages,
            ad_creative: AdCreative::default(),
        }
    }

    #[test]
    fn begin_generation_clears_prior_state() {
        let mut session = Session::new();
        session.complete_generation(content(), Uuid::new_v4());
        assert!(session.result.is_some());

        session.begin_generation().unwrap();
        assert_eq!(session.status, GenerationStatus::Generating);
        assert!(session.result.is_none());
        assert!(session.active_history_id.is_none());
    }

    #[test]
    fn only_one_generation_in_flight() {
        let mut session = Session::new();
        session.begin_generation().unwrap();
        assert_eq!(
            session.begin_generation(),
            Err(TransitionError::GenerationInFlight)
        );
    }

    #[test]
    fn failure_records_message_and_clears_partial_result() {
        let mut session = Session::new();
        session.begin_generation().unwrap();
        session.fail_generation("something broke".into());
        assert_eq!(
            session.status,
            GenerationStatus::Failed {
                message: "something broke".into()
            }
        );
        assert!(session.result.is_none());

        // A failed session can generate again.
        assert_eq!(session.begin_generation(), Ok(()));
    }

    #[test]
    fn success_resets_view_to_first_stage_pages() {
        let mut session = Session::new();
        session.view.output_view = OutputView::AdCreative;
        session.view.selected_stage = FunnelStage::Bofu;
        session.begin_generation().unwrap();

        let history_id = Uuid::new_v4();
        session.complete_generation(content(), history_id);
        assert_eq!(session.status, GenerationStatus::Ready);
        assert_eq!(session.active_history_id, Some(history_id));
        assert_eq!(session.view, ViewSelection::default());
        assert_eq!(session.view.selected_stage, FunnelStage::Tofu);
    }

    #[test]
    fn edit_rewrites_only_the_targeted_stage() {
        let mut session = Session::new();
        session.complete_generation(content(), Uuid::new_v4());

        session
            .edit_page(FunnelStage::Mofu, "<h1>edited</h1>".into())
            .unwrap();
        assert_eq!(
            session.page(FunnelStage::Mofu).unwrap().html_content,
            "<h1>edited</h1>"
        );
        assert_eq!(
            session.page(FunnelStage::Tofu).unwrap().html_content,
            "<h1>tofu</h1>"
        );
    }

    #[test]
    fn edit_without_result_is_an_error() {
        let mut session = Session::new();
        assert_eq!(
            session.edit_page(FunnelStage::Tofu, String::new()),
            Err(TransitionError::UnknownPage)
        );
    }

    #[test]
    fn loading_a_history_entry_makes_it_active() {
        let mut session = Session::new();
        let entry = HistoryEntry::new(
            "entry".into(),
            content().pages,
            AdCreative::default(),
        );
        session.load_entry(&entry);
        assert_eq!(session.status, GenerationStatus::Ready);
        assert_eq!(session.active_history_id, Some(entry.id));
        assert_eq!(
            session.page(FunnelStage::Bofu).unwrap().html_content,
            "<h1>bofu</h1>"
        );
    }
}
