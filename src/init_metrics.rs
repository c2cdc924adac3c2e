pub(super) fn init_metrics() {
    describe_toplevel();
    describe_ingest();
    describe_process();
    describe_sign();
    describe_object_storage();
}

fn describe_toplevel() {
    metrics::describe_counter!(UPLOADS, "How many video uploads have finished, by outcome");
    metrics::describe_counter!(
        THUMBNAILS,
        "How many thumbnail uploads have finished, by outcome"
    );
}

pub(crate) const UPLOADS: &str = "tubely.uploads";
pub(crate) const THUMBNAILS: &str = "tubely.thumbnails";

fn describe_ingest() {
    metrics::describe_histogram!(
        INGEST_BUFFER,
        "Timings for copying an upload to a scratch file"
    );
    metrics::describe_histogram!(INGEST_PROBE, "Timings for reading an upload's aspect ratio");
    metrics::describe_histogram!(
        INGEST_REWRITE,
        "Timings for moving an upload's metadata to the front of the file"
    );
    metrics::describe_histogram!(
        INGEST_PUBLISH,
        "Timings for copying a rewritten upload to the store"
    );
}

pub(crate) const INGEST_BUFFER: &str = "tubely.upload.buffer";
pub(crate) const INGEST_PROBE: &str = "tubely.upload.probe";
pub(crate) const INGEST_REWRITE: &str = "tubely.upload.rewrite";
pub(crate) const INGEST_PUBLISH: &str = "tubely.upload.publish";

fn describe_process() {
    metrics::describe_counter!(PROCESS_START, "How many external processes have been spawned");
    metrics::describe_histogram!(
        PROCESS_DURATION,
        "Timings for external processes, from spawn to exit"
    );
    metrics::describe_counter!(PROCESS_END, "How many external processes have exited");
}

pub(crate) const PROCESS_START: &str = "tubely.process.start";
pub(crate) const PROCESS_DURATION: &str = "tubely.process.duration";
pub(crate) const PROCESS_END: &str = "tubely.process.end";

fn describe_sign() {
    metrics::describe_counter!(SIGN, "How many video urls have been signed");
    metrics::describe_counter!(
        SIGN_CORRUPT_LOCATOR,
        "How many stored video locators couldn't be parsed when signing"
    );
}

pub(crate) const SIGN: &str = "tubely.sign";
pub(crate) const SIGN_CORRUPT_LOCATOR: &str = "tubely.sign.corrupt-locator";

fn describe_object_storage() {
    metrics::describe_histogram!(
        OBJECT_STORAGE_UPLOAD,
        "Timings for completing a multipart upload to object storage"
    );
}

pub(crate) const OBJECT_STORAGE_UPLOAD: &str = "tubely.object-storage.upload";
