use std::sync::Arc;
use tera::Tera;

/// Web templates, embedded at compile time.
const TEMPLATES: [(&str, &str); 5] = [
  (
    "layouts/base.html.tera",
    include_str!("../../../templates/layouts/base.html.tera"),
  ),
  (
    "pages/invoice_form.html.tera",
    include_str!("../../../templates/pages/invoice_form.html.tera"),
  ),
  (
    "pages/message.html.tera",
    include_str!("../../../templates/pages/message.html.tera"),
  ),
  (
    "partials/preview.html.tera",
    include_str!("../../../templates/partials/preview.html.tera"),
  ),
  (
    "partials/result.html.tera",
    include_str!("../../../templates/partials/result.html.tera"),
  ),
];

/// Template engine wrapper for rendering HTML templates
#[derive(Clone)]
pub struct TemplateEngine {
  tera: Arc<Tera>,
}

impl TemplateEngine {
  pub fn new() -> Result<Self, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES.to_vec())?;
    tera.autoescape_on(vec![".html.tera"]);

    Ok(Self {
      tera: Arc::new(tera),
    })
  }

  /// Render a template with the given context
  pub fn render(&self, template: &str, context: &tera::Context) -> Result<String, tera::Error> {
    self.tera.render(template, context)
  }
}
