//! Predicate-gated input-report subscribers.

use crate::device::DeviceHandle;
use crate::event::InputReportEvent;
use crate::report::ReportData;

/// Wraps an input-report subscriber and only forwards reports the predicate accepts.
pub struct FilteredListener<P, F> {
    predicate: P,
    inner: F,
}

impl<P, F> FilteredListener<P, F>
where
    P: Fn(&InputReportEvent) -> bool + Send + Sync + 'static,
    F: Fn(&ReportData, Option<u8>, &DeviceHandle, &InputReportEvent) + Send + Sync + 'static,
{
    pub fn new(predicate: P, inner: F) -> Self {
        Self { predicate, inner }
    }

    /// Turn into a subscriber for [`HidManager::on_input_report`](crate::HidManager::on_input_report).
    pub fn into_callback(
        self,
    ) -> impl Fn(&ReportData, Option<u8>, &DeviceHandle, &InputReportEvent) + Send + Sync + 'static
    {
        move |data, report_id, device, event| {
            if (self.predicate)(event) {
                (self.inner)(data, report_id, device, event);
            }
        }
    }
}

/// Only reports carrying `report_id`.
pub fn with_report_id<F>(
    report_id: u8,
    inner: F,
) -> impl Fn(&ReportData, Option<u8>, &DeviceHandle, &InputReportEvent) + Send + Sync + 'static
where
    F: Fn(&ReportData, Option<u8>, &DeviceHandle, &InputReportEvent) + Send + Sync + 'static,
{
    FilteredListener::new(
        move |ev: &InputReportEvent| ev.report_id == Some(report_id),
        inner,
    )
    .into_callback()
}
