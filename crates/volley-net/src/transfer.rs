//! A single HTTP transfer running on the engine's runtime.

use std::time::Instant;

use bytes::Bytes;
use crossbeam_channel::Sender;
use reqwest::Client;
use url::Url;
use volley_core::{Mark, Method, Request, TransferError, TransferProgress};

use crate::error::transfer_error;
use crate::form::build_form;
use crate::logging::targets;

/// What a running transfer reports back to the engine.
#[derive(Debug)]
pub(crate) enum Event {
    /// Response body bytes, in arrival order.
    Data { mark: Mark, chunk: Bytes },
    /// Progress after the response head and after every chunk.
    Progress {
        mark: Mark,
        progress: TransferProgress,
    },
    /// The transfer is over. Always the last event for a mark.
    Finished {
        mark: Mark,
        result: Result<u16, TransferError>,
    },
}

/// Run one transfer to completion, reporting through `events`.
pub(crate) async fn run(
    client: Client,
    mark: Mark,
    request: Request,
    url: Url,
    events: Sender<Event>,
) {
    let result = execute(&client, mark, &request, url, &events).await;
    match &result {
        Ok(status) => tracing::trace!(target: targets::TRANSFER, %mark, status, "transfer finished"),
        Err(err) => tracing::debug!(target: targets::TRANSFER, %mark, error = %err, "transfer failed"),
    }
    let _ = events.send(Event::Finished { mark, result });
}

async fn execute(
    client: &Client,
    mark: Mark,
    request: &Request,
    url: Url,
    events: &Sender<Event>,
) -> Result<u16, TransferError> {
    let started = Instant::now();
    let (builder, upload_total) = match request.method() {
        Method::Get => (client.get(url), 0),
        Method::Post => {
            let (form, payload) = build_form(request.fields()).await?;
            (client.post(url).multipart(form), payload)
        }
    };

    let mut response = builder.send().await.map_err(transfer_error)?;
    let status = response.status().as_u16();
    let mut progress = TransferProgress {
        elapsed: started.elapsed(),
        download_total: response.content_length().unwrap_or(0),
        downloaded: 0,
        upload_total,
        uploaded: upload_total,
    };
    report(events, Event::Progress { mark, progress })?;

    while let Some(chunk) = response.chunk().await.map_err(transfer_error)? {
        progress.downloaded += chunk.len() as u64;
        progress.elapsed = started.elapsed();
        report(events, Event::Data { mark, chunk })?;
        report(events, Event::Progress { mark, progress })?;
    }

    Ok(status)
}

/// Send an event; a closed channel means the engine is gone.
fn report(events: &Sender<Event>, event: Event) -> Result<(), TransferError> {
    events.send(event).map_err(|_| TransferError::Cancelled)
}
