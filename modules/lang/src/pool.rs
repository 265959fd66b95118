use std::sync::Arc;

use async_trait::async_trait;
use bomify_license::Reader;
use log::{debug, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{Error, LangPackage};

/// In-flight budget of the license-scan pool, per ecosystem module.
pub const MAX_CONCURRENCY: usize = 10;

/// Downloads one package's sources for license scanning.
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    async fn download(
        &self,
        pkg: &mut LangPackage,
        cancel: &CancellationToken,
    ) -> Result<(), Error>;
}

/// Run the fetch → extract → read-top-license sequence for every package
/// with bounded concurrency.
///
/// Tasks own their package exclusively and hand it back on completion;
/// results are folded back in the parent's insertion order. Per-package
/// failures are logged and the package stays without license info.
/// Cancellation aborts in-flight work, removes partial downloads and
/// surfaces [`Error::Cancelled`].
pub async fn scan_package_licenses(
    packages: Vec<LangPackage>,
    label: &str,
    reader: Arc<Reader>,
    fetcher: Arc<dyn PackageFetcher>,
    cancel: CancellationToken,
) -> Result<Vec<LangPackage>, Error> {
    let total = packages.len();
    log::info!("scanning licenses of {total} {label} packages");

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENCY));
    let mut tasks: JoinSet<(usize, LangPackage)> = JoinSet::new();

    for (index, mut pkg) in packages.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let reader = reader.clone();
        let fetcher = fetcher.clone();
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (index, pkg);
            };
            if cancel.is_cancelled() {
                return (index, pkg);
            }

            if pkg.local_dir.is_none() {
                if let Err(err) = fetcher.download(&mut pkg, &cancel).await {
                    // a package we cannot fetch stays in the document
                    // without license info
                    warn!("downloading {}: {err}", pkg.name);
                    return (index, pkg);
                }
            }

            let Some(dir) = pkg.local_dir.clone() else {
                return (index, pkg);
            };
            let scanned = tokio::task::spawn_blocking(move || {
                reader.read_top_license(&dir)
            })
            .await;
            match scanned {
                Ok(Ok(Some(result))) => {
                    debug!("package {} license is {}", pkg.name, result.license.license_id);
                    pkg.license_id = result.license.license_id;
                    pkg.copyright_text = result.text;
                }
                Ok(Ok(None)) => {
                    warn!("no license found for package {}", pkg.name);
                }
                Ok(Err(err)) => warn!("scanning {} for licensing info: {err}", pkg.name),
                Err(err) => warn!("license scan task for {} failed: {err}", pkg.name),
            }
            (index, pkg)
        });
    }

    let mut slots: Vec<Option<LangPackage>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, pkg)) => slots[index] = Some(pkg),
            Err(err) => warn!("license pool task panicked: {err}"),
        }
    }

    let mut results: Vec<LangPackage> = slots.into_iter().flatten().collect();
    if cancel.is_cancelled() {
        crate::download::remove_downloads(&mut results)?;
        return Err(Error::Cancelled);
    }
    Ok(results)
}
