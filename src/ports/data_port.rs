//! Data access port trait.

use crate::domain::error::RpsimError;
use crate::domain::panel::ReturnPanel;
use chrono::NaiveDate;

pub trait DataPort {
    /// Aligned returns for every available asset, restricted to
    /// `[start_date, end_date]` when given. Gaps stay gaps.
    fn load_panel(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<ReturnPanel, RpsimError>;

    fn list_assets(&self) -> Result<Vec<String>, RpsimError>;
}
