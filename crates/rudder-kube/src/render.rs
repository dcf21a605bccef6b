//! Rendering seam between the lifecycle and the template engine

use rudder_core::{LoadedChart, ReleaseInfo, TemplateContext, Values};
use rudder_engine::Engine;
use std::collections::BTreeMap;

use crate::error::Result;

/// Turns a chart and its computed values into `template -> document` pairs
///
/// `NOTES.txt` may appear among the outputs; it is split off as release notes.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        chart: &LoadedChart,
        values: &Values,
        release: &ReleaseInfo,
    ) -> Result<BTreeMap<String, String>>;
}

impl Renderer for Engine {
    fn render(
        &self,
        chart: &LoadedChart,
        values: &Values,
        release: &ReleaseInfo,
    ) -> Result<BTreeMap<String, String>> {
        let context = TemplateContext::new(values, release.clone(), &chart.metadata);
        Ok(self.render_chart(chart, &context)?)
    }
}

impl<R: Renderer + ?Sized> Renderer for std::sync::Arc<R> {
    fn render(
        &self,
        chart: &LoadedChart,
        values: &Values,
        release: &ReleaseInfo,
    ) -> Result<BTreeMap<String, String>> {
        (**self).render(chart, values, release)
    }
}
