use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::decoder::DicomFileDecoderFactory;
use crate::model::series_count;
use crate::service::MetadataService;

const APP_NAME: &str = "dicomscan";

pub fn run() -> ExitCode {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .try_init();

    let Some(directory) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: {APP_NAME} <directory>");
        return ExitCode::from(2);
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(scan_directory(&directory))
}

async fn scan_directory(directory: &Path) -> ExitCode {
    let files = match list_files(directory).await {
        Ok(files) => files,
        Err(err) => {
            log::error!("{}: cannot list directory ({err})", directory.display());
            return ExitCode::FAILURE;
        }
    };
    log::info!("Scanning {} file(s) in {}", files.len(), directory.display());

    let service = MetadataService::new(DicomFileDecoderFactory, ServiceConfig::from_env());
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; cancelling remaining files");
            interrupt.cancel();
        }
    });

    let report = service
        .extract_batch_with_cancel(files.iter().cloned(), &cancel)
        .await;

    for (study, members) in &service.group_by_study(&report.records) {
        let patient = service.build_patient_summary(&members[0]);
        println!(
            "{study}  {} ({})  {}  {} instance(s), {} series",
            patient.name,
            patient.patient_id,
            patient.modality,
            members.len(),
            series_count(members)
        );
    }

    if !report.cancelled {
        let extracted: BTreeSet<&Path> = report
            .records
            .iter()
            .map(|record| record.file_path.as_path())
            .collect();
        for file in files.iter().filter(|file| !extracted.contains(file.as_path())) {
            let validation = service.validate(file).await;
            println!("{}: {}", file.display(), validation.issues.join("; "));
        }
    }

    println!("{report}");
    ExitCode::SUCCESS
}

async fn list_files(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(directory).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
