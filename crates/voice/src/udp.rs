//! UDP Medien-Transport
//!
//! Vier nebenlaeufige Loops pro Sitzung, full duplex:
//!
//! ```text
//! AudioDevice::capture() --[Capture-Thread]--> mpsc (begrenzt, Drop bei voll)
//!     --[Sende-Task]--> UdpSocket::send_to(peer)
//!
//! UdpSocket::recv_from() --[Empfangs-Task]--> JitterBuffer::push
//!     --[Wiedergabe-Thread]--> JitterBuffer::pop --> AudioDevice::play()
//! ```
//!
//! Die blockierenden Geraete-Aufrufe laufen in eigenen std-Threads, das
//! Netzwerk in tokio-Tasks. Beendet wird ueber das `running`-Flag (Threads),
//! ein `watch`-Signal (Tasks) und `JitterBuffer::schliessen` (Wiedergabe).
//! Sendefehler werden geloggt und uebersprungen, kein Retry, kein Ack.

use duett_audio::AudioDevice;
use duett_core::SessionEvent;
use duett_protocol::voice::SEQUENZ_HEADER_BYTES;
use duett_protocol::{AudioFrame, MedienFormat, MedienPaket, MAX_FRAME_BYTES};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{VoiceError, VoiceResult};
use crate::jitter_buffer::JitterBuffer;

/// Empfangspuffer: groesster gueltiger Frame plus Header plus ein Byte,
/// damit zu grosse Datagramme erkannt werden statt abgeschnitten
const EMPFANGS_PUFFER: usize = MAX_FRAME_BYTES + SEQUENZ_HEADER_BYTES + 1;

/// Wie lange der Wiedergabe-Thread pro Runde auf einen Frame wartet
const WIEDERGABE_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration einer Medien-Sitzung
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Format der Datagramme (beide Seiten muessen uebereinstimmen)
    pub format: MedienFormat,
    /// Lokale Adresse des Empfangs-Sockets (Port 0 = OS waehlt)
    pub lokale_adresse: SocketAddr,
    /// Medien-Adresse des Gegenuebers
    pub peer: SocketAddr,
    /// Laenge der Queue zwischen Capture-Thread und Sende-Task
    pub sende_queue: usize,
}

impl TransportConfig {
    pub fn neu(lokale_adresse: SocketAddr, peer: SocketAddr) -> Self {
        Self {
            format: MedienFormat::default(),
            lokale_adresse,
            peer,
            sende_queue: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// Zaehler der Loops (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStatistik {
    pub aufgenommen: u64,
    pub gesendet: u64,
    pub sendefehler: u64,
    /// Frames, die wegen voller Sende-Queue verworfen wurden
    pub sende_verworfen: u64,
    pub empfangen: u64,
    /// Ungueltige oder veraltete Datagramme
    pub verworfen: u64,
    pub abgespielt: u64,
}

#[derive(Default)]
struct Zaehler {
    aufgenommen: AtomicU64,
    gesendet: AtomicU64,
    sendefehler: AtomicU64,
    sende_verworfen: AtomicU64,
    empfangen: AtomicU64,
    verworfen: AtomicU64,
    abgespielt: AtomicU64,
}

impl Zaehler {
    fn erhoehen(zaehler: &AtomicU64) {
        zaehler.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TransportStatistik {
        TransportStatistik {
            aufgenommen: self.aufgenommen.load(Ordering::Relaxed),
            gesendet: self.gesendet.load(Ordering::Relaxed),
            sendefehler: self.sendefehler.load(Ordering::Relaxed),
            sende_verworfen: self.sende_verworfen.load(Ordering::Relaxed),
            empfangen: self.empfangen.load(Ordering::Relaxed),
            verworfen: self.verworfen.load(Ordering::Relaxed),
            abgespielt: self.abgespielt.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// MedienSitzung
// ---------------------------------------------------------------------------

/// Laufender Medien-Transport zwischen zwei Peers
///
/// Lifecycle:
/// 1. `starten()` – bindet die Sockets und startet alle vier Loops
/// 2. `beenden()` – stoppt alles und wartet auf jeden Loop
///
/// Wird die Sitzung ohne `beenden()` gedroppt, werden die Loops nur
/// signalisiert, nicht abgewartet.
pub struct MedienSitzung {
    lokale_adresse: SocketAddr,
    peer: SocketAddr,
    running: Arc<AtomicBool>,
    jitter: Arc<JitterBuffer>,
    zaehler: Arc<Zaehler>,
    stopp_tx: watch::Sender<bool>,
    sende_task: Option<JoinHandle<()>>,
    empfangs_task: Option<JoinHandle<()>>,
    capture_thread: Option<std::thread::JoinHandle<()>>,
    wiedergabe_thread: Option<std::thread::JoinHandle<()>>,
}

impl MedienSitzung {
    /// Bindet die UDP-Sockets und startet Capture, Senden, Empfang und Wiedergabe
    ///
    /// `running` ist das Flag der Sitzung. Es muss beim Aufruf gesetzt sein;
    /// sobald es geloescht wird, beenden sich die Threads nach der laufenden
    /// Geraete-Operation. Geraetefehler beenden den betroffenen Loop und
    /// werden als `SessionEvent::Fehler` gemeldet.
    pub async fn starten(
        config: TransportConfig,
        geraet: Arc<dyn AudioDevice>,
        jitter: Arc<JitterBuffer>,
        running: Arc<AtomicBool>,
        events: broadcast::Sender<SessionEvent>,
    ) -> VoiceResult<Self> {
        if config.sende_queue == 0 {
            return Err(VoiceError::Konfiguration(
                "sende_queue muss mindestens 1 sein".into(),
            ));
        }

        let empfangs_socket = UdpSocket::bind(config.lokale_adresse).await?;
        let lokale_adresse = empfangs_socket.local_addr()?;

        // Eigener Socket zum Senden, Port waehlt das OS
        let sende_bind = if config.peer.is_ipv6() {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
        } else {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
        };
        let sende_socket = UdpSocket::bind(sende_bind).await?;

        info!(
            lokal = %lokale_adresse,
            peer = %config.peer,
            format = ?config.format,
            "Medien-Transport gestartet"
        );

        let zaehler = Arc::new(Zaehler::default());
        let (stopp_tx, stopp_rx) = watch::channel(false);
        let (frame_tx, frame_rx) = mpsc::channel::<AudioFrame>(config.sende_queue);

        let sende_task = tokio::spawn(sende_loop(
            sende_socket,
            config.peer,
            config.format,
            frame_rx,
            Arc::clone(&zaehler),
            stopp_rx.clone(),
        ));

        let empfangs_task = tokio::spawn(empfangs_loop(
            empfangs_socket,
            config.format,
            Arc::clone(&jitter),
            Arc::clone(&zaehler),
            stopp_rx,
        ));

        let capture_thread = {
            let geraet = Arc::clone(&geraet);
            let running = Arc::clone(&running);
            let zaehler = Arc::clone(&zaehler);
            let events = events.clone();
            std::thread::Builder::new()
                .name("duett-capture".to_string())
                .spawn(move || capture_loop(geraet, frame_tx, running, zaehler, events))?
        };

        let wiedergabe_thread = {
            let jitter = Arc::clone(&jitter);
            let running = Arc::clone(&running);
            let zaehler = Arc::clone(&zaehler);
            std::thread::Builder::new()
                .name("duett-wiedergabe".to_string())
                .spawn(move || wiedergabe_loop(geraet, jitter, running, zaehler, events))?
        };

        Ok(Self {
            lokale_adresse,
            peer: config.peer,
            running,
            jitter,
            zaehler,
            stopp_tx,
            sende_task: Some(sende_task),
            empfangs_task: Some(empfangs_task),
            capture_thread: Some(capture_thread),
            wiedergabe_thread: Some(wiedergabe_thread),
        })
    }

    /// Tatsaechlich gebundene Adresse des Empfangs-Sockets
    pub fn lokale_adresse(&self) -> SocketAddr {
        self.lokale_adresse
    }

    /// Medien-Adresse des Gegenuebers
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn statistik(&self) -> TransportStatistik {
        self.zaehler.snapshot()
    }

    fn signalisieren(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.stopp_tx.send(true);
        self.jitter.schliessen();
    }

    /// Stoppt alle Loops und wartet bis jeder beendet ist
    ///
    /// Die Wartezeit ist durch eine laufende Geraete-Operation pro Thread
    /// begrenzt.
    pub async fn beenden(mut self) -> VoiceResult<()> {
        debug!(lokal = %self.lokale_adresse, "Stoppe Medien-Transport");
        self.signalisieren();

        let mut ergebnis = Ok(());

        for (name, task) in [
            ("sende-task", self.sende_task.take()),
            ("empfangs-task", self.empfangs_task.take()),
        ] {
            if let Some(task) = task {
                if task.await.is_err() {
                    error!(loop_name = name, "Task mit Panic beendet");
                    ergebnis = Err(VoiceError::ThreadAbgestuerzt(name));
                }
            }
        }

        for (name, thread) in [
            ("duett-capture", self.capture_thread.take()),
            ("duett-wiedergabe", self.wiedergabe_thread.take()),
        ] {
            if let Some(thread) = thread {
                let beendet = tokio::task::spawn_blocking(move || thread.join()).await;
                if !matches!(beendet, Ok(Ok(()))) {
                    error!(thread = name, "Thread mit Panic beendet");
                    ergebnis = Err(VoiceError::ThreadAbgestuerzt(name));
                }
            }
        }

        let stat = self.zaehler.snapshot();
        info!(
            gesendet = stat.gesendet,
            empfangen = stat.empfangen,
            abgespielt = stat.abgespielt,
            "Medien-Transport gestoppt"
        );
        ergebnis
    }
}

impl Drop for MedienSitzung {
    fn drop(&mut self) {
        if self.sende_task.is_some() || self.capture_thread.is_some() {
            self.signalisieren();
        }
    }
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

/// Capture-Thread: nimmt Frames auf und reicht sie an den Sende-Task weiter
fn capture_loop(
    geraet: Arc<dyn AudioDevice>,
    frame_tx: mpsc::Sender<AudioFrame>,
    running: Arc<AtomicBool>,
    zaehler: Arc<Zaehler>,
    events: broadcast::Sender<SessionEvent>,
) {
    debug!("Capture-Loop gestartet");

    while running.load(Ordering::Acquire) {
        let frame = match geraet.capture() {
            Ok(frame) => frame,
            Err(e) if e.ist_voruebergehend() => continue,
            Err(e) => {
                error!("Aufnahme fehlgeschlagen: {}", e);
                let _ = events.send(SessionEvent::Fehler(format!("Aufnahme: {e}")));
                break;
            }
        };
        Zaehler::erhoehen(&zaehler.aufgenommen);

        match frame_tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Aktualitaet vor Vollstaendigkeit
                Zaehler::erhoehen(&zaehler.sende_verworfen);
                trace!("Sende-Queue voll, Frame verworfen");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }

    debug!("Capture-Loop beendet");
}

/// Wartet bis gestoppt wird oder der Sender wegfaellt
///
/// Gibt den `watch::Ref` sofort wieder frei, damit der Loop-Future `Send` bleibt.
async fn stopp_abwarten(stopp_rx: &mut watch::Receiver<bool>) {
    let _ = stopp_rx.wait_for(|stopp| *stopp).await;
}

/// Sende-Task: ein Datagramm pro Frame an den Peer
async fn sende_loop(
    socket: UdpSocket,
    peer: SocketAddr,
    format: MedienFormat,
    mut frame_rx: mpsc::Receiver<AudioFrame>,
    zaehler: Arc<Zaehler>,
    mut stopp_rx: watch::Receiver<bool>,
) {
    let mut sequenz: u32 = 0;
    debug!(peer = %peer, "Sende-Loop gestartet");

    loop {
        tokio::select! {
            _ = stopp_abwarten(&mut stopp_rx) => break,
            frame = frame_rx.recv() => {
                let Some(frame) = frame else { break };
                let datagramm = MedienPaket::kodieren(format, sequenz, &frame);
                sequenz = sequenz.wrapping_add(1);

                match socket.send_to(&datagramm, peer).await {
                    Ok(_) => Zaehler::erhoehen(&zaehler.gesendet),
                    Err(e) => {
                        Zaehler::erhoehen(&zaehler.sendefehler);
                        warn!(peer = %peer, "UDP-Sendefehler: {}", e);
                    }
                }
            }
        }
    }

    debug!("Sende-Loop beendet");
}

/// Empfangs-Task: Datagramme dekodieren und in den Jitter Buffer schreiben
async fn empfangs_loop(
    socket: UdpSocket,
    format: MedienFormat,
    jitter: Arc<JitterBuffer>,
    zaehler: Arc<Zaehler>,
    mut stopp_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; EMPFANGS_PUFFER];
    debug!("Empfangs-Loop gestartet");

    loop {
        tokio::select! {
            _ = stopp_abwarten(&mut stopp_rx) => break,
            ergebnis = socket.recv_from(&mut buf) => {
                let (laenge, absender) = match ergebnis {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("UDP-Empfangsfehler: {}", e);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        continue;
                    }
                };
                Zaehler::erhoehen(&zaehler.empfangen);

                let paket = match MedienPaket::dekodieren(format, &buf[..laenge]) {
                    Ok(p) => p,
                    Err(e) => {
                        Zaehler::erhoehen(&zaehler.verworfen);
                        debug!(absender = %absender, laenge, "Datagramm verworfen: {}", e);
                        continue;
                    }
                };

                match paket.sequenz {
                    Some(sequenz) => {
                        if !jitter.push_sequenziert(sequenz, paket.frame) {
                            Zaehler::erhoehen(&zaehler.verworfen);
                        }
                    }
                    None => jitter.push(paket.frame),
                }
            }
        }
    }

    debug!("Empfangs-Loop beendet");
}

/// Wiedergabe-Thread: Frames aus dem Jitter Buffer abspielen
fn wiedergabe_loop(
    geraet: Arc<dyn AudioDevice>,
    jitter: Arc<JitterBuffer>,
    running: Arc<AtomicBool>,
    zaehler: Arc<Zaehler>,
    events: broadcast::Sender<SessionEvent>,
) {
    debug!("Wiedergabe-Loop gestartet");

    while running.load(Ordering::Acquire) {
        let Some(frame) = jitter.pop_timeout(WIEDERGABE_POLL) else {
            if jitter.ist_geschlossen() {
                break;
            }
            continue;
        };

        if let Err(e) = geraet.play(frame) {
            error!("Wiedergabe fehlgeschlagen: {}", e);
            let _ = events.send(SessionEvent::Fehler(format!("Wiedergabe: {e}")));
            break;
        }
        Zaehler::erhoehen(&zaehler.abgespielt);
    }

    debug!("Wiedergabe-Loop beendet");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use duett_audio::{SynthConfig, SynthetischesGeraet};
    use std::time::Instant;

    fn synth(max_frames: Option<u64>) -> (Arc<SynthetischesGeraet>, crossbeam_channel::Receiver<AudioFrame>) {
        let (geraet, rx) = SynthetischesGeraet::neu(SynthConfig {
            frame_bytes: 256,
            frame_dauer: Duration::from_millis(5),
            max_frames,
        })
        .unwrap();
        (Arc::new(geraet), rx)
    }

    fn lokal() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    async fn sitzung(
        format: MedienFormat,
        peer: SocketAddr,
        geraet: Arc<SynthetischesGeraet>,
    ) -> MedienSitzung {
        let (events, _) = broadcast::channel(16);
        let mut config = TransportConfig::neu(lokal(), peer);
        config.format = format;
        MedienSitzung::starten(
            config,
            geraet,
            Arc::new(JitterBuffer::standard()),
            Arc::new(AtomicBool::new(true)),
            events,
        )
        .await
        .unwrap()
    }

    fn empfangene_nummern(rx: &crossbeam_channel::Receiver<AudioFrame>, anzahl: usize) -> Vec<u32> {
        let mut nummern = Vec::new();
        while nummern.len() < anzahl {
            match rx.recv_timeout(Duration::from_secs(3)) {
                Ok(f) => nummern.push(SynthetischesGeraet::frame_nummer(&f).unwrap()),
                Err(_) => break,
            }
        }
        nummern
    }

    async fn zehn_frames_in_reihenfolge(format: MedienFormat) {
        // B hoert nur zu, A sendet 10 Frames an B
        let (stumm, b_rx) = synth(Some(0));
        let b = sitzung(format, lokal(), stumm).await;

        let (sprecher, _a_rx) = synth(Some(10));
        let a = sitzung(format, b.lokale_adresse(), sprecher).await;

        let nummern = empfangene_nummern(&b_rx, 10);
        assert_eq!(nummern, (0..10).collect::<Vec<_>>());

        let stat_a = a.statistik();
        assert_eq!(stat_a.aufgenommen, 10);
        assert_eq!(stat_a.gesendet, 10);
        assert_eq!(b.statistik().abgespielt, 10);

        a.beenden().await.unwrap();
        b.beenden().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn roh_zehn_frames_ueber_loopback() {
        zehn_frames_in_reihenfolge(MedienFormat::Roh).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sequenziert_zehn_frames_ueber_loopback() {
        zehn_frames_in_reihenfolge(MedienFormat::Sequenziert).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn beenden_ist_zeitlich_begrenzt() {
        let (geraet, _rx) = synth(None);
        let s = sitzung(MedienFormat::Roh, "127.0.0.1:9".parse().unwrap(), geraet).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let start = Instant::now();
        s.beenden().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ungueltige_datagramme_werden_verworfen() {
        let (stumm, b_rx) = synth(Some(0));
        let b = sitzung(MedienFormat::Sequenziert, lokal(), stumm).await;

        let sender = UdpSocket::bind(lokal()).await.unwrap();
        // Zu kurz fuer den Sequenz-Header
        sender.send_to(&[1, 2], b.lokale_adresse()).await.unwrap();
        // Zu gross
        sender
            .send_to(&vec![0u8; MAX_FRAME_BYTES + SEQUENZ_HEADER_BYTES + 1], b.lokale_adresse())
            .await
            .unwrap();
        // Gueltig
        let frame = AudioFrame::neu(vec![0, 0, 0, 7]).unwrap();
        let gueltig = MedienPaket::kodieren(MedienFormat::Sequenziert, 1, &frame);
        sender.send_to(&gueltig, b.lokale_adresse()).await.unwrap();

        let abgespielt = b_rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(abgespielt, frame);

        let stat = b.statistik();
        assert_eq!(stat.empfangen, 3);
        assert_eq!(stat.verworfen, 2);
        b.beenden().await.unwrap();
    }

    #[tokio::test]
    async fn sende_queue_null_abgelehnt() {
        let (geraet, _rx) = synth(None);
        let (events, _) = broadcast::channel(4);
        let mut config = TransportConfig::neu(lokal(), lokal());
        config.sende_queue = 0;
        let ergebnis = MedienSitzung::starten(
            config,
            geraet,
            Arc::new(JitterBuffer::standard()),
            Arc::new(AtomicBool::new(true)),
            events,
        )
        .await;
        assert!(matches!(ergebnis, Err(VoiceError::Konfiguration(_))));
    }

    fn muss_send_sein<T: Send>(_: &T) {}

    #[tokio::test]
    async fn netz_loops_sind_spawnbar() {
        let socket = UdpSocket::bind(lokal()).await.unwrap();
        let (_frame_tx, frame_rx) = mpsc::channel(1);
        let (_stopp_tx, stopp_rx) = watch::channel(false);
        let sende = sende_loop(
            socket,
            lokal(),
            MedienFormat::Roh,
            frame_rx,
            Arc::new(Zaehler::default()),
            stopp_rx.clone(),
        );
        muss_send_sein(&sende);

        let socket = UdpSocket::bind(lokal()).await.unwrap();
        let empfang = empfangs_loop(
            socket,
            MedienFormat::Roh,
            Arc::new(JitterBuffer::standard()),
            Arc::new(Zaehler::default()),
            stopp_rx,
        );
        muss_send_sein(&empfang);
    }

    #[tokio::test]
    async fn empfangs_loop_endet_bei_stopp() {
        let socket = UdpSocket::bind(lokal()).await.unwrap();
        let (stopp_tx, stopp_rx) = watch::channel(false);
        let task = tokio::spawn(empfangs_loop(
            socket,
            MedienFormat::Roh,
            Arc::new(JitterBuffer::standard()),
            Arc::new(Zaehler::default()),
            stopp_rx,
        ));

        stopp_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("Empfangs-Loop haengt")
            .unwrap();
    }
}
