//! CALL/ANSWER-Handshake
//!
//! Der Anrufer verbindet sich mit dem Signal-Port des Peers und sendet
//! `CALL`, der Angerufene antwortet mit `ANSWER`. Beide Seiten lesen exakt
//! die Laenge des erwarteten Tokens; abweichende oder fehlende Bytes sind
//! ein Protokollfehler. Ergebnis ist die IP-Adresse des Peers, an die
//! anschliessend die Medien gesendet werden.

use duett_protocol::SignalToken;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::error::{SignalingError, SignalingResult};

/// Standard-Zeitlimit fuer den Verbindungsaufbau
pub const STANDARD_VERBINDUNGS_TIMEOUT: Duration = Duration::from_secs(5);

/// Standard-Zeitlimit fuer das Warten auf ein Token
pub const STANDARD_ANTWORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Zeitlimits des Handshakes
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub verbindungs_timeout: Duration,
    pub antwort_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            verbindungs_timeout: STANDARD_VERBINDUNGS_TIMEOUT,
            antwort_timeout: STANDARD_ANTWORT_TIMEOUT,
        }
    }
}

/// Zustand des Signal-Kanals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeZustand {
    #[default]
    Idle,
    /// Anrufer: verbindet bzw. wartet auf ANSWER
    Dialing,
    /// Angerufener: wartet auf Verbindung bzw. CALL
    Listening,
    /// Handshake erfolgreich
    Connected,
    /// Fehlgeschlagen oder aufgelegt
    Closed,
}

// ---------------------------------------------------------------------------
// SignalKanal
// ---------------------------------------------------------------------------

/// Signal-Kanal einer Sitzung (einmalig verwendbar)
///
/// Die TCP-Verbindung lebt nur waehrend des Handshakes und wird danach
/// geschlossen.
#[derive(Debug)]
pub struct SignalKanal {
    config: HandshakeConfig,
    zustand: HandshakeZustand,
}

impl SignalKanal {
    pub fn neu(config: HandshakeConfig) -> Self {
        Self {
            config,
            zustand: HandshakeZustand::Idle,
        }
    }

    pub fn zustand(&self) -> HandshakeZustand {
        self.zustand
    }

    /// Markiert den Kanal als geschlossen (Auflegen)
    pub fn schliessen(&mut self) {
        self.zustand = HandshakeZustand::Closed;
    }

    fn pruefe_idle(&self) -> SignalingResult<()> {
        if self.zustand == HandshakeZustand::Idle {
            Ok(())
        } else {
            Err(SignalingError::Protokoll(format!(
                "Signal-Kanal bereits verwendet (Zustand {:?})",
                self.zustand
            )))
        }
    }

    /// Rolle Anrufer: verbindet sich mit `host:port`, sendet CALL, erwartet ANSWER
    ///
    /// Gibt die IP-Adresse des Peers zurueck.
    pub async fn anrufen(
        &mut self,
        host: &str,
        port: u16,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SignalingResult<IpAddr> {
        self.pruefe_idle()?;
        self.zustand = HandshakeZustand::Dialing;

        let ergebnis = mit_abbruch(shutdown, self.anrufen_intern(host, port)).await;
        self.abschliessen(ergebnis)
    }

    async fn anrufen_intern(&self, host: &str, port: u16) -> SignalingResult<IpAddr> {
        let ziele: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| {
                tracing::debug!(host, fehler = %e, "Namensaufloesung fehlgeschlagen");
                SignalingError::Aufloesung(host.to_string())
            })?
            .collect();
        if ziele.is_empty() {
            return Err(SignalingError::Aufloesung(host.to_string()));
        }

        tracing::debug!(host, port, "Verbinde zum Peer");
        let mut stream = mit_timeout(
            self.config.verbindungs_timeout,
            "Verbindungsaufbau",
            async {
                TcpStream::connect(&ziele[..])
                    .await
                    .map_err(|e| SignalingError::Verbindung(format!("{host}:{port}: {e}")))
            },
        )
        .await?;
        let peer = stream.peer_addr()?;

        stream.write_all(SignalToken::Call.bytes()).await?;
        stream.flush().await?;
        tracing::debug!(peer = %peer, "CALL gesendet, warte auf ANSWER");

        let mut antwort = [0u8; 6];
        token_lesen(
            &mut stream,
            &mut antwort,
            self.config.antwort_timeout,
            "Warten auf ANSWER",
        )
        .await?;
        SignalToken::Answer
            .erwarten(&antwort)
            .map_err(|e| SignalingError::Protokoll(e.to_string()))?;

        tracing::info!(peer = %peer, "Anruf angenommen");
        Ok(peer.ip())
    }

    /// Rolle Angerufener: nimmt genau eine Verbindung an, erwartet CALL,
    /// antwortet mit ANSWER
    ///
    /// Das Warten auf den Anrufer hat kein Zeitlimit, ist aber ueber
    /// `shutdown` abbrechbar. Gibt die IP-Adresse des Anrufers zurueck.
    pub async fn annehmen(
        &mut self,
        listener: TcpListener,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SignalingResult<IpAddr> {
        self.pruefe_idle()?;
        self.zustand = HandshakeZustand::Listening;

        let ergebnis = mit_abbruch(shutdown, self.annehmen_intern(listener)).await;
        self.abschliessen(ergebnis)
    }

    async fn annehmen_intern(&self, listener: TcpListener) -> SignalingResult<IpAddr> {
        let (mut stream, peer) = listener.accept().await?;
        // Nur eine Verbindung pro Anruf
        drop(listener);
        tracing::debug!(peer = %peer, "Verbindung angenommen, warte auf CALL");

        let mut anfrage = [0u8; 4];
        token_lesen(
            &mut stream,
            &mut anfrage,
            self.config.antwort_timeout,
            "Warten auf CALL",
        )
        .await?;
        SignalToken::Call
            .erwarten(&anfrage)
            .map_err(|e| SignalingError::Protokoll(e.to_string()))?;

        stream.write_all(SignalToken::Answer.bytes()).await?;
        stream.flush().await?;

        tracing::info!(peer = %peer, "Anruf angenommen, ANSWER gesendet");
        Ok(peer.ip())
    }

    fn abschliessen(&mut self, ergebnis: SignalingResult<IpAddr>) -> SignalingResult<IpAddr> {
        self.zustand = match ergebnis {
            Ok(_) => HandshakeZustand::Connected,
            Err(_) => HandshakeZustand::Closed,
        };
        ergebnis
    }
}

/// Bindet den Signal-Port des Angerufenen
///
/// Synchron, damit ein belegter Port sofort gemeldet wird. Muss im Kontext
/// einer tokio-Laufzeit aufgerufen werden (`Handle::enter`).
pub fn lauschen(adresse: SocketAddr) -> SignalingResult<TcpListener> {
    let listener = std::net::TcpListener::bind(adresse)?;
    listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(listener)?;
    tracing::info!(adresse = %listener.local_addr()?, "Warte auf Anruf");
    Ok(listener)
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

/// Raced `fut` gegen das Shutdown-Signal
///
/// Ein gedroppter Sender gilt nicht als Abbruch.
async fn mit_abbruch<T>(
    shutdown: &mut watch::Receiver<bool>,
    fut: impl Future<Output = SignalingResult<T>>,
) -> SignalingResult<T> {
    tokio::select! {
        biased;
        Ok(_) = shutdown.wait_for(|stopp| *stopp) => {
            tracing::debug!("Handshake durch Shutdown abgebrochen");
            Err(SignalingError::Abgebrochen)
        }
        ergebnis = fut => ergebnis,
    }
}

async fn mit_timeout<T>(
    dauer: Duration,
    schritt: &'static str,
    fut: impl Future<Output = SignalingResult<T>>,
) -> SignalingResult<T> {
    tokio::time::timeout(dauer, fut)
        .await
        .map_err(|_| SignalingError::Timeout(schritt))?
}

/// Liest exakt `puffer.len()` Bytes
///
/// Schliesst oder resettet die Gegenstelle vorher, ist das ein
/// Protokollfehler und kein IO-Fehler.
async fn token_lesen(
    stream: &mut TcpStream,
    puffer: &mut [u8],
    dauer: Duration,
    schritt: &'static str,
) -> SignalingResult<()> {
    let erwartet = puffer.len();
    mit_timeout(dauer, schritt, async {
        match stream.read_exact(puffer).await {
            Ok(_) => Ok(()),
            Err(e) if vorzeitig_beendet(&e) => Err(SignalingError::Protokoll(format!(
                "Verbindung beendet bevor {erwartet} Bytes gelesen wurden ({})",
                e.kind()
            ))),
            Err(e) => Err(e.into()),
        }
    })
    .await
}

fn vorzeitig_beendet(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use duett_protocol::{ANSWER, CALL};
    use std::time::Instant;

    fn lokal() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn kurz() -> HandshakeConfig {
        HandshakeConfig {
            verbindungs_timeout: Duration::from_secs(2),
            antwort_timeout: Duration::from_millis(300),
        }
    }

    #[tokio::test]
    async fn anrufer_und_angerufener_verbinden_sich() {
        let listener = lauschen(lokal()).unwrap();
        let port = listener.local_addr().unwrap().port();
        let (_tx, mut rx_b) = watch::channel(false);
        let mut rx_a = rx_b.clone();

        let angerufener = tokio::spawn(async move {
            let mut kanal = SignalKanal::neu(kurz());
            let ergebnis = kanal.annehmen(listener, &mut rx_b).await;
            (ergebnis, kanal.zustand())
        });

        let mut anrufer = SignalKanal::neu(kurz());
        let peer = anrufer.anrufen("127.0.0.1", port, &mut rx_a).await.unwrap();
        assert_eq!(peer, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(anrufer.zustand(), HandshakeZustand::Connected);

        let (ergebnis, zustand) = angerufener.await.unwrap();
        assert_eq!(ergebnis.unwrap(), "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(zustand, HandshakeZustand::Connected);
    }

    #[tokio::test]
    async fn angerufener_antwortet_exakt_mit_answer() {
        let listener = lauschen(lokal()).unwrap();
        let adresse = listener.local_addr().unwrap();
        let (_tx, mut rx) = watch::channel(false);

        let angerufener = tokio::spawn(async move {
            SignalKanal::neu(kurz()).annehmen(listener, &mut rx).await
        });

        let mut stream = TcpStream::connect(adresse).await.unwrap();
        stream.write_all(CALL).await.unwrap();
        let mut antwort = Vec::new();
        stream.read_to_end(&mut antwort).await.unwrap();
        assert_eq!(antwort, ANSWER);

        assert!(angerufener.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn falsches_token_ist_protokollfehler() {
        let listener = lauschen(lokal()).unwrap();
        let port = listener.local_addr().unwrap().port();
        let (_tx, mut rx) = watch::channel(false);

        // Gegenstelle antwortet mit 6 falschen Bytes
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut anfrage = [0u8; 4];
            stream.read_exact(&mut anfrage).await.unwrap();
            stream.write_all(b"BUSY!!").await.unwrap();
        });

        let mut kanal = SignalKanal::neu(kurz());
        let e = kanal.anrufen("127.0.0.1", port, &mut rx).await.unwrap_err();
        assert!(matches!(e, SignalingError::Protokoll(_)), "{e:?}");
        assert_eq!(kanal.zustand(), HandshakeZustand::Closed);
    }

    #[tokio::test]
    async fn angerufener_lehnt_falsches_token_ab() {
        let listener = lauschen(lokal()).unwrap();
        let adresse = listener.local_addr().unwrap();
        let (_tx, mut rx) = watch::channel(false);

        let angerufener = tokio::spawn(async move {
            SignalKanal::neu(kurz()).annehmen(listener, &mut rx).await
        });

        let mut stream = TcpStream::connect(adresse).await.unwrap();
        stream.write_all(b"HALO").await.unwrap();

        let e = angerufener.await.unwrap().unwrap_err();
        assert!(matches!(e, SignalingError::Protokoll(_)), "{e:?}");
    }

    #[tokio::test]
    async fn vorzeitig_geschlossene_verbindung_ist_protokollfehler() {
        let listener = lauschen(lokal()).unwrap();
        let port = listener.local_addr().unwrap().port();
        let (_tx, mut rx) = watch::channel(false);

        // Liest CALL vollstaendig, schickt nur einen Teil von ANSWER und schliesst
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut anfrage = [0u8; 4];
            stream.read_exact(&mut anfrage).await.unwrap();
            stream.write_all(b"ANS").await.unwrap();
        });

        let e = SignalKanal::neu(kurz())
            .anrufen("127.0.0.1", port, &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(e, SignalingError::Protokoll(_)), "{e:?}");
    }

    #[tokio::test]
    async fn zurueckgesetzte_verbindung_ist_protokollfehler() {
        let listener = lauschen(lokal()).unwrap();
        let port = listener.local_addr().unwrap().port();
        let (_tx, mut rx) = watch::channel(false);

        // Ungelesene Bytes beim Schliessen: der Kernel sendet RST
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut teil = [0u8; 2];
            stream.read_exact(&mut teil).await.unwrap();
        });

        let mut kanal = SignalKanal::neu(kurz());
        let e = kanal.anrufen("127.0.0.1", port, &mut rx).await.unwrap_err();
        assert!(matches!(e, SignalingError::Protokoll(_)), "{e:?}");
        assert_eq!(kanal.zustand(), HandshakeZustand::Closed);
    }

    #[tokio::test]
    async fn belegter_port_wird_beim_lauschen_gemeldet() {
        let belegt = lauschen(lokal()).unwrap();
        let e = lauschen(belegt.local_addr().unwrap()).unwrap_err();
        assert!(matches!(e, SignalingError::Io(_)), "{e:?}");
    }

    #[tokio::test]
    async fn keine_antwort_fuehrt_zu_timeout() {
        let listener = lauschen(lokal()).unwrap();
        let port = listener.local_addr().unwrap().port();
        let (_tx, mut rx) = watch::channel(false);

        // Nimmt an, antwortet aber nie
        let _halter = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let e = SignalKanal::neu(kurz())
            .anrufen("127.0.0.1", port, &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(e, SignalingError::Timeout(_)), "{e:?}");
    }

    #[tokio::test]
    async fn verbindung_abgelehnt_schlaegt_schnell_fehl() {
        // Port belegen und wieder freigeben: dort lauscht niemand
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let (_tx, mut rx) = watch::channel(false);

        let start = Instant::now();
        let e = SignalKanal::neu(kurz())
            .anrufen("127.0.0.1", port, &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(e, SignalingError::Verbindung(_)), "{e:?}");
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn unbekannter_host_ist_aufloesungsfehler() {
        let (_tx, mut rx) = watch::channel(false);
        let e = SignalKanal::neu(kurz())
            .anrufen("host.invalid", 6000, &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(e, SignalingError::Aufloesung(_)), "{e:?}");
    }

    #[tokio::test]
    async fn warten_auf_anrufer_ist_abbrechbar() {
        let listener = lauschen(lokal()).unwrap();
        let (tx, mut rx) = watch::channel(false);

        let angerufener = tokio::spawn(async move {
            let mut kanal = SignalKanal::neu(kurz());
            let e = kanal.annehmen(listener, &mut rx).await.unwrap_err();
            (e, kanal.zustand())
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let (e, zustand) = tokio::time::timeout(Duration::from_secs(1), angerufener)
            .await
            .expect("Abbruch muss sofort wirken")
            .unwrap();
        assert!(e.ist_abbruch());
        assert_eq!(zustand, HandshakeZustand::Closed);
    }

    #[tokio::test]
    async fn kanal_ist_nur_einmal_verwendbar() {
        let (_tx, mut rx) = watch::channel(false);
        let mut kanal = SignalKanal::neu(kurz());
        kanal.schliessen();
        let e = kanal.anrufen("127.0.0.1", 1, &mut rx).await.unwrap_err();
        assert!(matches!(e, SignalingError::Protokoll(_)));
    }
}
