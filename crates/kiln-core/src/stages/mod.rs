//! Built-in stages
//!
//! - `css` - brace validation, minification in production
//! - `autoprefix` - vendor-prefixed copies of declarations
//! - `css-extract` - emit a stylesheet as its own linked file
//! - `style-inject` - wrap a stylesheet in a script that injects it
//! - `script` - comment stripping in production
//! - `resource` - copy verbatim

use std::sync::Arc;

use crate::stage::Stage;

pub mod resource;
pub mod script;
pub mod style;

pub use resource::Resource;
pub use script::Script;
pub use style::{Autoprefix, Css, CssExtract, StyleInject};

/// Every built-in stage
pub fn builtins() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(Css),
        Arc::new(Autoprefix),
        Arc::new(CssExtract),
        Arc::new(StyleInject),
        Arc::new(Script),
        Arc::new(Resource),
    ]
}
