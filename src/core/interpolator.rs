// src/core/interpolator.rs

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::core::config_model::ConfigTemplateModel;
use crate::core::dynamic::Dyn;

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\{\{\s*(.+?)\s*\}\}").unwrap();
}

/// Renders `{{ path }}` placeholders against a built model.
///
/// Paths are dotted with optional `[n]` indexing (and `["dotted.key"]` for keys containing
/// dots) and start at one of the model roots
/// (`resources`, `services`, `service`, `environment`, `datacenter`). A placeholder may end
/// with `?? 'fallback'`, used when the path is absent. Missing paths render as `""`;
/// rendering never fails.
#[derive(Debug, Clone)]
pub struct Interpolator {
    root: Dyn,
}

impl Interpolator {
    pub fn new(model: &ConfigTemplateModel) -> Self {
        Self { root: model.root() }
    }

    /// Renders against an arbitrary tree instead of a full model.
    pub fn over(root: Dyn) -> Self {
        Self { root }
    }

    pub fn render(&self, template: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(template, |caps: &Captures<'_>| {
                caps.get(1)
                    .map(|m| self.expand(m.as_str()))
                    .unwrap_or_default()
            })
            .into_owned()
    }

    fn expand(&self, expression: &str) -> String {
        let (path, fallback) = match expression.split_once("??") {
            Some((path, fallback)) => (path.trim(), Some(unquote(fallback.trim()))),
            None => (expression.trim(), None),
        };

        let value = self.root.path(path);
        match (value.is_absent(), fallback) {
            (true, Some(fallback)) => fallback.to_string(),
            _ => value.to_text(),
        }
    }
}

fn unquote(raw: &str) -> &str {
    ['\'', '"']
        .iter()
        .find_map(|q| raw.strip_prefix(*q).and_then(|s| s.strip_suffix(*q)))
        .unwrap_or(raw)
}

/// Shorthand for `Interpolator::new(model).render(template)`.
pub fn render(template: &str, model: &ConfigTemplateModel) -> String {
    Interpolator::new(model).render(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dynamic::{ConfigMap, ConfigValue};

    fn root() -> Dyn {
        let mut storage = ConfigMap::new();
        storage.insert("primary", "DefaultEndpointsProtocol=https;AccountName=a");
        let mut resources = ConfigMap::new();
        resources.insert("azureStorage", storage);
        let mut root = ConfigMap::new();
        root.insert("resources", resources);
        root.insert(
            "hosts",
            vec![ConfigValue::from("h0"), ConfigValue::from("h1")],
        );
        root.insert(
            "attributes",
            [("Microsoft.WindowsAzure.Plugins.RemoteAccess.Enabled", "true")]
                .into_iter()
                .collect::<ConfigMap>(),
        );
        Dyn::wrap(root)
    }

    #[test]
    fn test_render_present_and_missing_paths() {
        let out = Interpolator::over(root()).render(
            "<Setting name=\"Storage\" value=\"{{ resources.azureStorage.primary }}\" />\n\
             <Setting name=\"Missing\" value=\"{{resources.azureStorage.missing}}\" />",
        );
        assert_eq!(
            out,
            "<Setting name=\"Storage\" value=\"DefaultEndpointsProtocol=https;AccountName=a\" />\n\
             <Setting name=\"Missing\" value=\"\" />"
        );
    }

    #[test]
    fn test_render_indexing_and_fallback() {
        let interpolator = Interpolator::over(root());
        assert_eq!(interpolator.render("{{ hosts[1] }}|{{ hosts }}"), "h1|h0,h1");
        assert_eq!(interpolator.render("{{ nothing.here ?? 'n/a' }}"), "n/a");
        assert_eq!(interpolator.render("{{ hosts[0] ?? \"n/a\" }}"), "h0");
    }

    #[test]
    fn test_render_dotted_setting_names() {
        let interpolator = Interpolator::over(root());
        assert_eq!(
            interpolator.render(r#"{{ attributes["Microsoft.WindowsAzure.Plugins.RemoteAccess.Enabled"] }}"#),
            "true"
        );
        assert_eq!(
            interpolator.render("{{ attributes['Microsoft.WindowsAzure.Plugins.Caching'] ?? 'false' }}"),
            "false"
        );
    }

    #[test]
    fn test_text_without_placeholders_is_untouched() {
        let text = "plain { text } with {single} braces";
        assert_eq!(Interpolator::over(Dyn::Absent).render(text), text);
    }
}
