//! SessionController – Lebenszyklus eines Anrufs
//!
//! `start_call` und `answer_call` kehren sofort zurueck; der Handshake laeuft
//! in einem tokio-Task. Dessen Ergebnis (Erfolg oder Fehler) erfaehrt die
//! Oberflaeche ueber [`SessionController::abonnieren`].
//!
//! ## Abbruch
//! - `running` (AtomicBool): von den Geraete-Threads pro Runde geprueft
//! - Shutdown-`watch`: bricht den laufenden Handshake ab
//! - `JitterBuffer::schliessen`: weckt den Wiedergabe-Thread
//!
//! `hang_up` setzt alle drei und wartet dann auf jeden Task und Thread.

use duett_audio::AudioDevice;
use duett_core::{Rolle, SessionEvent, SessionId, SessionState};
use duett_signaling::{lauschen, SignalKanal};
use duett_voice::{JitterBuffer, MedienSitzung, TransportConfig};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};

/// Kapazitaet des Event-Kanals
const EVENT_KAPAZITAET: usize = 64;

// ---------------------------------------------------------------------------
// Gemeinsamer Zustand (Controller + Signal-Task)
// ---------------------------------------------------------------------------

struct Gemeinsam {
    zustand: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Gemeinsam {
    fn zustand(&self) -> SessionState {
        *self.zustand.lock()
    }

    fn setzen(&self, neu: SessionState) {
        let mut zustand = self.zustand.lock();
        self.wechseln(&mut zustand, neu);
    }

    /// Wechselt nur, wenn der aktuelle Zustand `erwartet` ist
    fn uebergang(&self, erwartet: SessionState, neu: SessionState) -> bool {
        let mut zustand = self.zustand.lock();
        if *zustand != erwartet {
            return false;
        }
        self.wechseln(&mut zustand, neu);
        true
    }

    fn wechseln(&self, zustand: &mut SessionState, neu: SessionState) {
        if *zustand == neu {
            return;
        }
        tracing::info!(von = %*zustand, nach = %neu, "Zustandswechsel");
        *zustand = neu;
        // Keine Abonnenten ist kein Fehler
        let _ = self.events.send(SessionEvent::ZustandGeaendert(neu));
    }

    fn melden(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Handles eines laufenden Anrufs
struct AktiverAnruf {
    shutdown_tx: watch::Sender<bool>,
    jitter: Arc<JitterBuffer>,
    task: JoinHandle<Option<MedienSitzung>>,
}

/// Rollen-spezifischer Teil des Handshakes
enum Auftrag {
    Anrufen { host: String },
    Annehmen { listener: TcpListener },
}

/// Alles, was der Signal-Task braucht
struct Ablauf {
    rolle: Rolle,
    config: SessionConfig,
    geraet: Arc<dyn AudioDevice>,
    jitter: Arc<JitterBuffer>,
    running: Arc<AtomicBool>,
    gemeinsam: Arc<Gemeinsam>,
    shutdown_rx: watch::Receiver<bool>,
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Steuert genau eine Sitzung (ein Anruf gleichzeitig)
///
/// Lifecycle:
/// 1. `neu()` – innerhalb einer tokio-Laufzeit erstellen
/// 2. `start_call(host)` oder `answer_call()` – nur im Zustand `Idle`
/// 3. `hang_up()` – aus jedem Zustand, idempotent
pub struct SessionController {
    id: SessionId,
    config: SessionConfig,
    geraet: Arc<dyn AudioDevice>,
    laufzeit: Handle,
    running: Arc<AtomicBool>,
    gemeinsam: Arc<Gemeinsam>,
    aktiv: Mutex<Option<AktiverAnruf>>,
    /// Serialisiert `hang_up`: jeder Aufrufer kehrt erst nach dem Abbau zurueck
    abbau: tokio::sync::Mutex<()>,
}

impl SessionController {
    /// Erstellt einen Controller auf der aktuellen tokio-Laufzeit
    ///
    /// # Fehler
    /// - `Kern(Konfiguration)` bei ungueltiger Konfiguration
    /// - `KeineLaufzeit` ausserhalb einer tokio-Laufzeit
    pub fn neu(config: SessionConfig, geraet: Arc<dyn AudioDevice>) -> SessionResult<Self> {
        let laufzeit = Handle::try_current().map_err(|_| SessionError::KeineLaufzeit)?;
        Self::mit_laufzeit(config, geraet, laufzeit)
    }

    /// Erstellt einen Controller, der seine Tasks auf `laufzeit` startet
    pub fn mit_laufzeit(
        config: SessionConfig,
        geraet: Arc<dyn AudioDevice>,
        laufzeit: Handle,
    ) -> SessionResult<Self> {
        config.validieren()?;
        let (events, _) = broadcast::channel(EVENT_KAPAZITAET);
        let id = SessionId::new();
        tracing::debug!(sitzung = %id, "SessionController erstellt");

        Ok(Self {
            id,
            config,
            geraet,
            laufzeit,
            running: Arc::new(AtomicBool::new(false)),
            gemeinsam: Arc::new(Gemeinsam {
                zustand: Mutex::new(SessionState::Idle),
                events,
            }),
            aktiv: Mutex::new(None),
            abbau: tokio::sync::Mutex::new(()),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Aktueller Sitzungszustand
    pub fn zustand(&self) -> SessionState {
        self.gemeinsam.zustand()
    }

    /// Statustext des aktuellen Zustands fuer die Oberflaeche
    pub fn status_text(&self) -> &'static str {
        self.zustand().status_text()
    }

    /// Gibt true zurueck solange die Sitzung laeuft (Handshake oder Gespraech)
    pub fn laeuft(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Empfaenger fuer Zustandswechsel, Fehler und Medien-Start
    pub fn abonnieren(&self) -> broadcast::Receiver<SessionEvent> {
        self.gemeinsam.events.subscribe()
    }

    /// Ruft `host` an (Rolle Anrufer)
    ///
    /// Kehrt sofort zurueck. Scheitert der Handshake, wird
    /// `SessionEvent::Fehler` gesendet und der Zustand geht zurueck auf `Idle`.
    pub fn start_call(&self, host: impl Into<String>) -> SessionResult<()> {
        let host = host.into();
        self.starten(Rolle::Anrufer, || Ok(Auftrag::Anrufen { host }))
    }

    /// Wartet auf einen Anruf (Rolle Angerufener)
    ///
    /// Der Signal-Port ist nach der Rueckkehr gebunden; ist er belegt, wird
    /// der Fehler direkt zurueckgegeben und der Zustand bleibt `Idle`.
    pub fn answer_call(&self) -> SessionResult<()> {
        let adresse = self.config.signal_adresse();
        self.starten(Rolle::Angerufener, || {
            // Der Listener wird beim Reaktor der Sitzungs-Laufzeit registriert
            let _laufzeit = self.laufzeit.enter();
            let listener = lauschen(adresse)?;
            Ok(Auftrag::Annehmen { listener })
        })
    }

    fn starten(
        &self,
        rolle: Rolle,
        vorbereiten: impl FnOnce() -> SessionResult<Auftrag>,
    ) -> SessionResult<()> {
        let mut aktiv = self.aktiv.lock();

        let zustand = self.gemeinsam.zustand();
        if !zustand.ist_idle() {
            return Err(SessionError::UngueltigerZustand(zustand));
        }
        // Reste eines gescheiterten Handshakes: der Task ist bereits fertig
        if let Some(alt) = aktiv.take() {
            alt.task.abort();
        }

        let jitter = Arc::new(JitterBuffer::neu(self.config.jitter_kapazitaet)?);
        let auftrag = vorbereiten()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.running.store(true, Ordering::Release);
        self.gemeinsam.setzen(SessionState::Signaling(rolle));

        let ablauf = Ablauf {
            rolle,
            config: self.config.clone(),
            geraet: Arc::clone(&self.geraet),
            jitter: Arc::clone(&jitter),
            running: Arc::clone(&self.running),
            gemeinsam: Arc::clone(&self.gemeinsam),
            shutdown_rx,
        };
        let span = tracing::info_span!("sitzung", id = %self.id, rolle = %rolle);
        let task = self
            .laufzeit
            .spawn(anruf_ablauf(ablauf, auftrag).instrument(span));

        *aktiv = Some(AktiverAnruf {
            shutdown_tx,
            jitter,
            task,
        });
        Ok(())
    }

    /// Legt auf: stoppt Handshake und Medien und wartet auf alle Loops
    ///
    /// Aus jedem Zustand erlaubt; ein zweiter Aufruf ist wirkungslos.
    /// Ueberlappende Aufrufe kehren alle erst zurueck, wenn der Abbau
    /// abgeschlossen ist.
    pub async fn hang_up(&self) -> SessionResult<()> {
        let _abbau = self.abbau.lock().await;
        let anruf = {
            let mut aktiv = self.aktiv.lock();
            self.running.store(false, Ordering::Release);
            match aktiv.take() {
                Some(anruf) => anruf,
                None => return Ok(()),
            }
        };

        let war_aktiv = !self.gemeinsam.zustand().ist_idle();
        if war_aktiv {
            self.gemeinsam.setzen(SessionState::Terminating);
        }

        let _ = anruf.shutdown_tx.send(true);
        anruf.jitter.schliessen();

        let mut ergebnis = Ok(());
        match anruf.task.await {
            Ok(Some(sitzung)) => {
                if let Err(e) = sitzung.beenden().await {
                    tracing::error!(sitzung = %self.id, "Medien-Transport nicht sauber beendet: {}", e);
                    ergebnis = Err(e.into());
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(sitzung = %self.id, "Signal-Task abgestuerzt: {}", e);
            }
        }

        if war_aktiv {
            self.gemeinsam.setzen(SessionState::Idle);
        }
        tracing::info!(sitzung = %self.id, "Aufgelegt");
        ergebnis
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(anruf) = self.aktiv.get_mut().take() {
            let _ = anruf.shutdown_tx.send(true);
            anruf.jitter.schliessen();
            // Der Task beendet sich selbst; eine gestartete MedienSitzung
            // signalisiert ihre Loops beim Drop
        }
    }
}

// ---------------------------------------------------------------------------
// Signal-Task
// ---------------------------------------------------------------------------

/// Handshake und anschliessender Start der Medien
///
/// Gibt die laufende `MedienSitzung` zurueck, damit `hang_up` sie beenden
/// kann. `None` wenn der Handshake gescheitert oder abgebrochen ist.
async fn anruf_ablauf(ablauf: Ablauf, auftrag: Auftrag) -> Option<MedienSitzung> {
    let Ablauf {
        rolle,
        config,
        geraet,
        jitter,
        running,
        gemeinsam,
        mut shutdown_rx,
    } = ablauf;

    let mut kanal = SignalKanal::neu(config.handshake.clone());
    let handshake = match auftrag {
        Auftrag::Anrufen { host } => {
            kanal
                .anrufen(&host, config.ziel_signal_port(), &mut shutdown_rx)
                .await
        }
        Auftrag::Annehmen { listener } => kanal.annehmen(listener, &mut shutdown_rx).await,
    };

    let peer_ip = match handshake {
        Ok(ip) => ip,
        // Aufgelegt waehrend des Handshakes: hang_up uebernimmt den Zustand
        Err(e) if e.ist_abbruch() => return None,
        Err(e) => {
            fehlschlag(rolle, &running, &gemeinsam, format!("Handshake fehlgeschlagen: {e}"));
            return None;
        }
    };

    if !running.load(Ordering::Acquire) {
        return None;
    }

    let transport = TransportConfig {
        format: config.format,
        lokale_adresse: config.medien_adresse(),
        peer: SocketAddr::new(peer_ip, config.ziel_medien_port()),
        sende_queue: config.sende_queue,
    };
    let peer = transport.peer;

    let sitzung = match MedienSitzung::starten(
        transport,
        geraet,
        jitter,
        Arc::clone(&running),
        gemeinsam.events.clone(),
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            fehlschlag(rolle, &running, &gemeinsam, format!("Medien-Start fehlgeschlagen: {e}"));
            return None;
        }
    };

    kanal.schliessen();
    if gemeinsam.uebergang(SessionState::Signaling(rolle), SessionState::Connected) {
        gemeinsam.melden(SessionEvent::MedienBereit { peer });
        tracing::info!(peer = %peer, "Gespraech aufgebaut");
    }
    Some(sitzung)
}

/// Impliziter Abbruch nach gescheitertem Handshake
///
/// Wirkt nur, wenn nicht gleichzeitig aufgelegt wurde.
fn fehlschlag(rolle: Rolle, running: &AtomicBool, gemeinsam: &Gemeinsam, nachricht: String) {
    let mut zustand = gemeinsam.zustand.lock();
    if *zustand != SessionState::Signaling(rolle) {
        return;
    }
    // Vor dem Wechsel auf Idle, sonst koennte ein neuer Anruf sein Flag verlieren
    running.store(false, Ordering::Release);
    gemeinsam.wechseln(&mut zustand, SessionState::Idle);
    drop(zustand);

    tracing::warn!("{}", nachricht);
    gemeinsam.melden(SessionEvent::Fehler(nachricht));
}
