use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Timelike};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use atendia_channel::MessageSender;
use atendia_core::calendar::{format_date, format_time};
use atendia_core::config::ReminderConfig;
use atendia_core::domain::appointment::Appointment;
use atendia_db::{BookingLedger, LedgerError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
}

pub fn reminder_text(appointment: &Appointment) -> String {
    format!(
        "👋 ¡Hola {}! Te recordamos que mañana tenés turno a las {} en el consultorio. \
         Si necesitás cancelar o cambiarlo, escribinos por acá. ¡Te esperamos!",
        appointment.patient_name,
        format_time(appointment.time)
    )
}

pub struct ReminderScheduler {
    ledger: Arc<BookingLedger>,
    sender: Arc<dyn MessageSender>,
    config: ReminderConfig,
}

impl ReminderScheduler {
    pub fn new(
        ledger: Arc<BookingLedger>,
        sender: Arc<dyn MessageSender>,
        config: ReminderConfig,
    ) -> Self {
        Self { ledger, sender, config }
    }

    /// Inclusive on both ends: with 8 and 20 the last sweep happens at 20:xx.
    pub fn in_window(&self, now: NaiveDateTime) -> bool {
        let hour = now.hour();
        hour >= self.config.window_start_hour && hour <= self.config.window_end_hour
    }

    /// Reminds every confirmed, not-yet-reminded appointment for tomorrow. A failed
    /// delivery leaves that appointment unmarked for the next sweep.
    pub async fn run_sweep(&self) -> Result<SweepReport, LedgerError> {
        let tomorrow = self.ledger.clock().tomorrow();
        let due = self.ledger.pending_reminders(tomorrow).await?;
        let mut report = SweepReport { due: due.len(), ..SweepReport::default() };

        for appointment in &due {
            if let Err(send_error) =
                self.sender.send(&appointment.patient_phone, &reminder_text(appointment)).await
            {
                report.failed += 1;
                warn!(
                    event_name = "reminders.send_failed",
                    appointment_id = appointment.id.0,
                    error = %send_error,
                    "reminder delivery failed; will retry next sweep"
                );
                continue;
            }

            match self.ledger.mark_reminded(appointment.id).await {
                Ok(_) => {
                    report.sent += 1;
                    info!(
                        event_name = "reminders.sent",
                        appointment_id = appointment.id.0,
                        date = %format_date(appointment.date),
                        "reminder delivered"
                    );
                }
                Err(mark_error) => {
                    report.failed += 1;
                    error!(
                        event_name = "reminders.mark_failed",
                        appointment_id = appointment.id.0,
                        error = %mark_error,
                        "reminder sent but could not be recorded"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Sweeps every `interval_secs` inside the window until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        info!(
            event_name = "reminders.started",
            interval_secs = self.config.interval_secs,
            window_start_hour = self.config.window_start_hour,
            window_end_hour = self.config.window_end_hour,
            "reminder scheduler active"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            let now = self.ledger.clock().now();
            if !self.in_window(now) {
                debug!(event_name = "reminders.outside_window", hour = now.hour(), "skipping sweep");
                continue;
            }

            match self.run_sweep().await {
                Ok(report) => info!(
                    event_name = "reminders.sweep_completed",
                    due = report.due,
                    sent = report.sent,
                    failed = report.failed,
                    "reminder sweep finished"
                ),
                Err(sweep_error) => error!(
                    event_name = "reminders.sweep_failed",
                    error = %sweep_error,
                    "reminder sweep could not read appointments"
                ),
            }
        }

        info!(event_name = "reminders.stopped", "reminder scheduler stopped");
    }
}
