//! `resource` stage: emit the file as-is

use crate::asset::AssetType;
use crate::stage::{Content, Stage, StageContext, StageFailure, StageOptions};

/// Identity stage for files that are copied to the output verbatim
pub struct Resource;

impl Stage for Resource {
    fn name(&self) -> &str {
        "resource"
    }

    fn input_type(&self) -> Option<AssetType> {
        None
    }

    fn apply(
        &self,
        input: Content,
        _options: &StageOptions,
        _ctx: &StageContext,
    ) -> Result<Content, StageFailure> {
        Ok(input)
    }
}
