use crate::{error::DropError, util::FileProbe};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    FileUrl,
    Url,
    FinderNode,
    Data,
}

impl Representation {
    pub const PRIORITY: [Representation; 4] = [
        Representation::FileUrl,
        Representation::Url,
        Representation::FinderNode,
        Representation::Data,
    ];

    pub fn type_id(self) -> &'static str {
        match self {
            Representation::FileUrl => "public.file-url",
            Representation::Url => "public.url",
            Representation::FinderNode => "com.apple.finder.node",
            Representation::Data => "public.data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    Text(String),
    Data(Vec<u8>),
    Path(PathBuf),
}

pub trait DropPayload: Send + Sync {
    fn supports(&self, rep: Representation) -> bool;

    fn load(&self, rep: Representation)
    -> impl Future<Output = Result<PayloadItem, String>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct StaticPayload {
    items: Vec<(Representation, PayloadItem)>,
}

impl StaticPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a representation; the first item registered for a kind wins.
    pub fn with(mut self, rep: Representation, item: PayloadItem) -> Self {
        if !self.supports(rep) {
            self.items.push((rep, item));
        }
        self
    }

    pub fn from_args(drops: &[String], data: Option<Vec<u8>>) -> Self {
        let mut payload = Self::new();
        for raw in drops {
            let raw = raw.trim();
            if raw.to_ascii_lowercase().starts_with("file://") {
                payload = payload.with(Representation::FileUrl, PayloadItem::Text(raw.to_string()));
            } else if raw.contains("://") {
                payload = payload.with(Representation::Url, PayloadItem::Text(raw.to_string()));
            } else {
                let path = std::path::absolute(raw).unwrap_or_else(|_| PathBuf::from(raw));
                payload = payload.with(Representation::FinderNode, PayloadItem::Path(path));
            }
        }
        if let Some(bytes) = data {
            payload = payload.with(Representation::Data, PayloadItem::Data(bytes));
        }
        payload
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl DropPayload for StaticPayload {
    fn supports(&self, rep: Representation) -> bool {
        self.items.iter().any(|(r, _)| *r == rep)
    }

    fn load(
        &self,
        rep: Representation,
    ) -> impl Future<Output = Result<PayloadItem, String>> + Send {
        let found = self
            .items
            .iter()
            .find(|(r, _)| *r == rep)
            .map(|(_, item)| item.clone());
        async move { found.ok_or_else(|| format!("no {} representation", rep.type_id())) }
    }
}

pub struct DropResolver {
    extension: String,
    fs: Arc<dyn FileProbe>,
}

impl DropResolver {
    pub fn new(extension: &str, fs: Arc<dyn FileProbe>) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            fs,
        }
    }

    pub async fn resolve<P: DropPayload>(&self, payload: &P) -> Result<PathBuf, DropError> {
        let mut tried = Vec::new();

        for rep in Representation::PRIORITY {
            if !payload.supports(rep) {
                continue;
            }
            tried.push(rep.type_id().to_string());

            let item = match payload.load(rep).await {
                Ok(item) => item,
                Err(err) => {
                    warn!("loading {} failed: {err}", rep.type_id());
                    continue;
                }
            };

            let Some(path) = materialize(&item) else {
                warn!("could not create a path from {} item", rep.type_id());
                continue;
            };

            if !path.is_absolute() || !self.fs.exists(&path) {
                warn!(
                    "{} gave unusable path {}",
                    rep.type_id(),
                    path.display()
                );
                continue;
            }

            debug!("materialized {} via {}", path.display(), rep.type_id());
            return self.validate(path);
        }

        Err(DropError::InvalidDropPayload { tried })
    }

    fn validate(&self, path: PathBuf) -> Result<PathBuf, DropError> {
        if has_extension(&path, &self.extension) {
            info!("accepted drop: {}", path.display());
            Ok(path)
        } else {
            Err(DropError::WrongInputType {
                path,
                expected: self.extension.clone(),
            })
        }
    }
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

fn materialize(item: &PayloadItem) -> Option<PathBuf> {
    match item {
        PayloadItem::Path(p) => Some(p.clone()),
        PayloadItem::Text(s) => path_from_url_str(s),
        PayloadItem::Data(bytes) => {
            let s = std::str::from_utf8(bytes).ok()?;
            path_from_url_str(s.trim_end_matches('\0'))
        }
    }
}

fn path_from_url_str(raw: &str) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match Url::parse(raw) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        Ok(_) => None,
        Err(_) => {
            let p = Path::new(raw);
            p.is_absolute().then(|| p.to_path_buf())
        }
    }
}
