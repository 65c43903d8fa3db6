//! Owned model of an HTML page and its forms.
//!
//! The page is parsed once; afterwards forms are plain data that can be
//! filled in (as a user typing into inputs) and read back at submit time.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{ExchangeError, ExchangeResult};

/// Position of a form in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormId(pub usize);

impl std::fmt::Display for FormId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "form#{}", self.0)
    }
}

/// A named control inside a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    /// `type` attribute, or the tag name for `select`/`textarea`.
    pub field_type: String,
    /// Current value. `None` until the page or the user sets one.
    pub value: Option<String>,
}

/// A `<form>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub id: FormId,
    /// Raw `action` attribute.
    pub action: Option<String>,
    /// Upper-cased `method` attribute, `GET` when absent.
    pub method: String,
    pub classes: Vec<String>,
    pub fields: Vec<FormField>,
}

impl Form {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Current value of the first field named `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(|f| f.value.as_deref())
    }

    /// Set the value of the first field named `name`.
    ///
    /// Returns `false` if the form has no such field.
    pub fn set_value(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => {
                field.value = Some(value.into());
                true
            }
            None => false,
        }
    }
}

/// A parsed page: its URL and every form it contains.
#[derive(Debug, Clone)]
pub struct Page {
    url: Url,
    forms: Vec<Form>,
}

impl Page {
    /// Parse `html` served from `url`.
    pub fn parse(html: &str, url: &str) -> ExchangeResult<Self> {
        let url = Url::parse(url).map_err(|e| ExchangeError::InvalidUrl {
            url: url.to_string(),
            source: e,
        })?;
        Ok(Self {
            url,
            forms: parse_forms(html),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn forms(&self) -> &[Form] {
        &self.forms
    }

    pub fn form(&self, id: FormId) -> Option<&Form> {
        self.forms.get(id.0)
    }

    pub fn form_mut(&mut self, id: FormId) -> Option<&mut Form> {
        self.forms.get_mut(id.0)
    }

    /// Forms carrying `class`, in document order.
    pub fn forms_with_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a Form> + 'a {
        self.forms.iter().filter(move |f| f.has_class(class))
    }

    /// Absolute URL a form submits to.
    ///
    /// A missing or empty action targets the page itself.
    pub fn action_url(&self, form: &Form) -> ExchangeResult<Url> {
        match form.action.as_deref().map(str::trim) {
            None | Some("") => Ok(self.url.clone()),
            Some(action) => self.url.join(action).map_err(|e| ExchangeError::InvalidUrl {
                url: action.to_string(),
                source: e,
            }),
        }
    }
}

fn parse_forms(html: &str) -> Vec<Form> {
    let document = Html::parse_document(html);
    let (Ok(form_sel), Ok(field_sel)) = (
        Selector::parse("form"),
        Selector::parse("input, select, textarea"),
    ) else {
        return Vec::new();
    };

    document
        .select(&form_sel)
        .enumerate()
        .map(|(i, form)| {
            let el = form.value();
            Form {
                id: FormId(i),
                action: el.attr("action").map(String::from),
                method: el.attr("method").unwrap_or("GET").to_uppercase(),
                classes: el.classes().map(String::from).collect(),
                fields: form.select(&field_sel).filter_map(parse_field).collect(),
            }
        })
        .collect()
}

fn parse_field(field: ElementRef<'_>) -> Option<FormField> {
    let el = field.value();
    let name = el.attr("name").filter(|n| !n.is_empty())?.to_string();
    let field_type = el.attr("type").unwrap_or(el.name()).to_lowercase();
    let value = match el.name() {
        "textarea" => Some(field.text().collect::<String>()),
        _ => el.attr("value").map(String::from),
    };
    Some(FormField {
        name,
        field_type,
        value,
    })
}
