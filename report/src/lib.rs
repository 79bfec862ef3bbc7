pub mod plot;
pub mod render;
pub mod results;

pub use plot::{line_plot, pair_plot};
pub use render::{render, write_report, NO_LABEL_SENTINEL, RenderError, RenderResult, RenderedReport};
pub use results::{
    subtest_pass, test_pass, unit_pass, SubTestResult, Test, Unit, ValidationRun, Value, ValueData,
};
