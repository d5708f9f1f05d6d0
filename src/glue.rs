//! Page-side glue for the base template: PWA head tags and the registration script.

use tracing::warn;

use crate::config::Config;

/// Directory a worker script may control without extra headers.
fn max_scope(script: &str) -> &str {
  match script.rfind('/') {
    Some(idx) => &script[..=idx],
    None => "/",
  }
}

/// Whether `scope` lies outside what `script` may control by default.
///
/// The server then has to send `Service-Worker-Allowed` with the script.
pub fn needs_allowed_header(script: &str, scope: &str) -> bool {
  !scope.starts_with(max_scope(script))
}

/// Tags for the template's `<head>`, below `<title>`.
pub fn head_tags(config: &Config) -> String {
  let page = &config.page;
  format!(
    r#"<!-- PWA manifest -->
<link rel="manifest" href="{manifest}">
<!-- iOS support -->
<meta name="apple-mobile-web-app-capable" content="yes">
<meta name="apple-mobile-web-app-status-bar-style" content="{status_bar}">
<meta name="apple-mobile-web-app-title" content="{title}">
<link rel="apple-touch-icon" href="{icon}">
<meta name="theme-color" content="{theme}">
"#,
    manifest = page.manifest,
    status_bar = page.status_bar_style,
    title = page.app_title,
    icon = page.icon,
    theme = page.theme_color,
  )
}

/// Registration script for the bottom of `<body>`. Success and failure are only logged.
pub fn registration_script(config: &Config) -> String {
  let worker = &config.worker;
  format!(
    r#"<script>
  if ('serviceWorker' in navigator) {{
    window.addEventListener('load', () => {{
      navigator.serviceWorker.register('{script}', {{ scope: '{scope}' }})
        .then((registration) => {{
          console.log('ServiceWorker registration successful with scope: ', registration.scope);
        }}, (err) => {{
          console.log('ServiceWorker registration failed: ', err);
        }});
    }});
  }}
</script>
"#,
    script = worker.script,
    scope = worker.scope,
  )
}

/// Everything `pantry snippet` prints.
pub fn render(config: &Config) -> String {
  let mut out = String::new();

  if needs_allowed_header(&config.worker.script, &config.worker.scope) {
    warn!(
      script = %config.worker.script,
      scope = %config.worker.scope,
      "Scope is wider than the script's directory"
    );
    out.push_str(&format!(
      "<!-- Serve {} with the header `Service-Worker-Allowed: {}` or registration is rejected -->\n",
      config.worker.script, config.worker.scope
    ));
  }

  out.push_str("<!-- In <head> -->\n");
  out.push_str(&head_tags(config));
  out.push_str("\n<!-- Before </body> -->\n");
  out.push_str(&registration_script(config));
  out
}
