//! Template engine based on MiniJinja

use minijinja::Environment;
use rudder_core::{LoadedChart, TemplateContext};
use std::collections::BTreeMap;

use crate::error::{Result, TemplateError};
use crate::filters;

/// Name of the notes template; rendered like any other file but not applied
pub const NOTES_FILE: &str = "NOTES.txt";

pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: true }
    }

    /// Fail on undefined variables
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            strict_mode: self.strict_mode,
        }
    }
}

/// Renders chart templates
#[derive(Debug, Clone)]
pub struct Engine {
    strict_mode: bool,
}

impl Default for Engine {
    fn default() -> Self {
        EngineBuilder::new().build()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        env.set_undefined_behavior(if self.strict_mode {
            minijinja::UndefinedBehavior::Strict
        } else {
            minijinja::UndefinedBehavior::Lenient
        });

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("trunc", filters::trunc);

        env
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        context: &TemplateContext,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();
        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?;

        let tmpl = env
            .get_template(template_name)
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?;

        let rendered = tmpl
            .render(Self::context_value(context))
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?;
        Ok(rendered)
    }

    /// Render every template of a chart
    ///
    /// Keys are paths relative to `templates/`. Helper templates and documents
    /// that render to nothing are left out. `NOTES.txt` is included as-is.
    pub fn render_chart(
        &self,
        chart: &LoadedChart,
        context: &TemplateContext,
    ) -> Result<BTreeMap<String, String>> {
        let template_files = chart.template_files()?;

        let mut env = self.create_environment();
        let mut sources = BTreeMap::new();

        for file_path in &template_files {
            let rel_path = file_path
                .strip_prefix(&chart.templates_dir)
                .unwrap_or(file_path);
            let name = rel_path.to_string_lossy().replace('\\', "/");
            let content = std::fs::read_to_string(file_path)?;

            env.add_template_owned(name.clone(), content.clone())
                .map_err(|e| TemplateError::from_minijinja(e, &name, &content))?;
            sources.insert(name, content);
        }

        let ctx = Self::context_value(context);
        let mut rendered = BTreeMap::new();

        for (name, source) in &sources {
            let is_helper = name
                .rsplit('/')
                .next()
                .map(|file| file.starts_with('_'))
                .unwrap_or(false);
            if is_helper {
                continue;
            }

            let tmpl = env
                .get_template(name)
                .map_err(|e| TemplateError::from_minijinja(e, name, source))?;
            let output = tmpl
                .render(&ctx)
                .map_err(|e| TemplateError::from_minijinja(e, name, source))?;

            let trimmed = output.trim();
            if trimmed.is_empty() || trimmed == "---" {
                continue;
            }

            let output_name = name.trim_end_matches(".j2").to_string();
            rendered.insert(output_name, output);
        }

        Ok(rendered)
    }

    fn context_value(context: &TemplateContext) -> minijinja::Value {
        minijinja::context! {
            values => &context.values,
            release => &context.release,
            chart => &context.chart,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rudder_core::{ChartMetadata, ReleaseInfo, Values};
    use semver::Version;
    use tempfile::TempDir;

    fn context(values: &str) -> TemplateContext {
        TemplateContext::new(
            &Values::from_yaml(values).unwrap(),
            ReleaseInfo::for_install("web", "prod", 1),
            &ChartMetadata::new("demo", Version::new(0, 1, 0)),
        )
    }

    fn chart_with(files: &[(&str, &str)]) -> (TempDir, LoadedChart) {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("Chart.yaml"),
            "apiVersion: v2\nname: demo\nversion: 0.1.0\n",
        )
        .unwrap();
        std::fs::create_dir_all(tmp.path().join("templates")).unwrap();
        for (name, content) in files {
            std::fs::write(tmp.path().join("templates").join(name), content).unwrap();
        }
        let chart = LoadedChart::load(tmp.path()).unwrap();
        (tmp, chart)
    }

    #[test]
    fn test_render_string() {
        let engine = Engine::default();
        let out = engine
            .render_string(
                "name: {{ release.name }}-{{ chart.name }}\nreplicas: {{ values.replicas }}",
                &context("replicas: 2"),
                "inline",
            )
            .unwrap();
        assert_eq!(out, "name: web-demo\nreplicas: 2");
    }

    #[test]
    fn test_strict_mode_rejects_undefined() {
        let engine = Engine::default();
        let err = engine
            .render_string("{{ values.missing.deep }}", &context("{}"), "t.yaml")
            .unwrap_err();
        assert!(err.to_string().contains("t.yaml"));
    }

    #[test]
    fn test_lenient_mode() {
        let engine = Engine::builder().strict(false).build();
        let out = engine
            .render_string("x{{ values.missing }}x", &context("{}"), "t.yaml")
            .unwrap();
        assert_eq!(out, "xx");
    }

    #[test]
    fn test_render_chart_skips_helpers_and_empty() {
        let (_tmp, chart) = chart_with(&[
            ("_helpers.tpl", "{% macro fullname(name) %}{{ name }}-app{% endmacro %}"),
            (
                "configmap.yaml",
                "{% from '_helpers.tpl' import fullname %}kind: ConfigMap\nmetadata:\n  name: {{ fullname(release.name) }}\n",
            ),
            ("disabled.yaml", "{% if values.enabled %}kind: Service{% endif %}"),
            ("NOTES.txt", "Installed {{ release.name }}"),
        ]);

        let rendered = Engine::default()
            .render_chart(&chart, &context("enabled: false"))
            .unwrap();

        let keys: Vec<&str> = rendered.keys().map(String::as_str).collect();
        assert_eq!(keys, vec![NOTES_FILE, "configmap.yaml"]);
        assert!(rendered["configmap.yaml"].contains("name: web-app"));
        assert_eq!(rendered[NOTES_FILE], "Installed web");
    }

    #[test]
    fn test_render_chart_snapshot() {
        let (_tmp, chart) = chart_with(&[(
            "deployment.yaml",
            "kind: Deployment\nmetadata:\n  name: {{ release.name }}\nspec:\n  replicas: {{ values.replicas }}\n  labels:{{ values.labels | toyaml | nindent(4) }}\n",
        )]);

        let rendered = Engine::default()
            .render_chart(&chart, &context("replicas: 3\nlabels:\n  tier: web\n"))
            .unwrap();

        insta::assert_snapshot!(rendered["deployment.yaml"], @r"
        kind: Deployment
        metadata:
          name: web
        spec:
          replicas: 3
          labels:
            tier: web
        ");
    }
}
