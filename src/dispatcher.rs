// src/dispatcher.rs
//! Consumer side of a session: cuts lines, completes commands, parses NMEA

use crate::{
    command::ACK_TOKEN,
    context::SessionContext,
    gps::{nmea::SentenceType, NmeaProcessor},
};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

/// How long one wait for a line lasts before the run flag is checked again
const LINE_WAIT: Duration = Duration::from_millis(50);

/// What became of one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Completed the pending command
    Ack,
    Sentence(SentenceType),
    Dropped,
}

#[derive(Debug)]
pub struct Dispatcher {
    ctx: Arc<SessionContext>,
    processor: NmeaProcessor,
}

impl Dispatcher {
    pub fn new(ctx: Arc<SessionContext>, processor: NmeaProcessor) -> Self {
        Self { ctx, processor }
    }

    pub fn processor(&self) -> &NmeaProcessor {
        &self.processor
    }

    /// Route one line: an acknowledgement when a command is waiting,
    /// otherwise an NMEA sentence.
    pub fn dispatch(&mut self, line: &[u8]) -> Dispatch {
        if line.starts_with(ACK_TOKEN) && self.ctx.handshake.acknowledge() {
            return Dispatch::Ack;
        }

        let callbacks = self.ctx.callbacks();
        match self
            .processor
            .process_line(line, Utc::now(), callbacks.as_ref())
        {
            Ok(kind) => Dispatch::Sentence(kind),
            Err(e) => {
                debug!("Dropping line {:?}: {}", String::from_utf8_lossy(line), e);
                Dispatch::Dropped
            }
        }
    }

    /// Dispatcher thread body
    pub fn run(mut self) {
        info!("Dispatcher started");
        while self.ctx.is_running() {
            if let Some(line) = self.ctx.buffer.wait_line(LINE_WAIT) {
                self.dispatch(&line);
            }
        }
        info!("Dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        callbacks::GpsCallbacks,
        command::Command,
        gps::data::{GpsLocation, SvStatus},
        port::buffer::LineBuffer,
    };
    use std::sync::Mutex;
    use std::thread;

    #[derive(Default)]
    struct Counter {
        fixes: Mutex<Vec<GpsLocation>>,
        reports: Mutex<usize>,
    }

    impl GpsCallbacks for Counter {
        fn on_fix(&self, fix: &GpsLocation) {
            self.fixes.lock().unwrap().push(*fix);
        }

        fn on_satellite_status(&self, _status: &SvStatus) {
            *self.reports.lock().unwrap() += 1;
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<SessionContext>) {
        let ctx = Arc::new(SessionContext::new(
            LineBuffer::default(),
            Duration::from_secs(5),
        ));
        (Dispatcher::new(Arc::clone(&ctx), NmeaProcessor::default()), ctx)
    }

    #[test]
    fn test_stray_ack_is_dropped() {
        let (mut dispatcher, _ctx) = dispatcher();
        assert_eq!(dispatcher.dispatch(b"OK"), Dispatch::Dropped);
    }

    #[test]
    fn test_garbage_is_dropped() {
        let (mut dispatcher, _ctx) = dispatcher();
        assert_eq!(dispatcher.dispatch(b"$GPXYZ,1,2*00"), Dispatch::Dropped);
        assert_eq!(dispatcher.dispatch(b"AT+ZGRUN=2"), Dispatch::Dropped);
        assert_eq!(dispatcher.dispatch(b""), Dispatch::Dropped);
    }

    #[test]
    fn test_ack_completes_pending_command() {
        let (mut dispatcher, ctx) = dispatcher();
        let issuer = Arc::clone(&ctx);
        let handle = thread::spawn(move || issuer.handshake.issue(Command::Init, |_| Ok(())));

        while !ctx.handshake.is_pending() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(dispatcher.dispatch(b"OK"), Dispatch::Ack);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_sentences_reach_callbacks() {
        let (mut dispatcher, ctx) = dispatcher();
        let counter = Arc::new(Counter::default());
        ctx.set_callbacks(counter.clone());

        let lines: [&[u8]; 4] = [
            b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47",
            b"$GPVTG,054.7,T,034.4,M,005.5,N,010.2,K*48",
            b"$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39",
            b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A",
        ];
        let kinds: Vec<_> = lines.iter().map(|l| dispatcher.dispatch(l)).collect();
        assert_eq!(
            kinds,
            vec![
                Dispatch::Sentence(SentenceType::Gga),
                Dispatch::Sentence(SentenceType::Vtg),
                Dispatch::Sentence(SentenceType::Gsa),
                Dispatch::Sentence(SentenceType::Rmc),
            ]
        );

        let fixes = counter.fixes.lock().unwrap();
        assert_eq!(fixes.len(), 1);
        assert!(fixes[0].is_complete());
        assert_eq!(*counter.reports.lock().unwrap(), 1);
    }
}
