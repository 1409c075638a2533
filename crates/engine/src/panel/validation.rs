// Schema attachment and store-side validation.

use gridsync_common::schema::SheetSchema;
use gridsync_common::types::{ValidateRequest, ValidationResult};
use tracing::{debug, warn};

use super::Panel;
use crate::store::TabularStore;

impl<S: TabularStore> Panel<S> {
    /// Attach or detach a schema. Earlier validation results no longer apply
    /// and are dropped.
    pub fn set_schema(&self, schema: Option<SheetSchema>) {
        let mut state = self.state();
        state.view.schema = schema;
        state.view.validation = None;
    }

    /// Validate the active sheet against the attached schema.
    ///
    /// Without an open file or a schema this returns an empty result and
    /// never reaches the store. A failed call is surfaced in the view's
    /// `error` and also yields an empty result. Pending edits play no part.
    pub async fn validate(&self) -> ValidationResult {
        let request = {
            let state = self.state();
            let view = &state.view;
            match (&view.file_path, &view.schema) {
                (Some(path), Some(schema)) => ValidateRequest {
                    path: path.clone(),
                    sheet: view.active_sheet.clone(),
                    range: view.active_range.clone(),
                    schema: schema.clone(),
                    offset: None,
                    max_rows: None,
                },
                _ => return ValidationResult::default(),
            }
        };
        let schema = request.schema.clone();

        let result = self.call(self.store.validate(request)).await;

        let mut state = self.state();
        match result {
            Ok(result) => {
                debug!(
                    panel = %self.panel_id,
                    errors = result.errors.len(),
                    warnings = result.warnings.len(),
                    rows_checked = result.rows_checked,
                    "validation finished"
                );
                // A schema swapped in meanwhile makes this result stale.
                if state.view.schema.as_ref() == Some(&schema) {
                    state.view.validation = Some(result.clone());
                }
                state.view.error = None;
                result
            }
            Err(e) => {
                warn!(panel = %self.panel_id, error = %e, "validation failed");
                state.view.error = Some(e.to_string());
                ValidationResult::default()
            }
        }
    }
}
