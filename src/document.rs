use crate::assets::AssetTags;

/// The static parts of the emitted HTML document.
#[derive(Clone, Debug)]
pub struct DocumentShell {
    pub lang: String,
    pub title: String,
    /// Extra markup placed in `<head>` before the asset tags.
    pub head: String,
}

impl Default for DocumentShell {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            title: "App".to_string(),
            head: concat!(
                r#"<meta charset="utf-8"/>"#,
                r#"<link rel="shortcut icon" href="/favicon.ico"/>"#,
                r#"<meta name="viewport" content="width=device-width,initial-scale=1,shrink-to-fit=no"/>"#,
            )
            .to_string(),
        }
    }
}

impl DocumentShell {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Wraps `root` markup and `tags` into a full document.
    ///
    /// Scripts are emitted in the order given, so a snapshot script at
    /// the front of `tags.scripts` runs before the application bundle.
    pub fn render(&self, root: &str, tags: &AssetTags) -> String {
        let Self { lang, title, head } = self;
        let AssetTags {
            scripts,
            links,
            styles,
        } = tags;
        format!(
            "<!DOCTYPE html>\
             <html lang=\"{lang}\">\
             <head>{head}<title>{title}</title>{styles}{links}</head>\
             <body>\
             <noscript>You need to enable JavaScript to run this app.</noscript>\
             <div id=\"root\">{root}</div>\
             {scripts}\
             </body>\
             </html>"
        )
    }
}
