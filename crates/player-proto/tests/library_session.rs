use std::path::Path;

use player_proto::catalog::Catalog;
use player_proto::config::Config;
use player_proto::playback::{auto_advance, LoopMode, PlaybackState};
use player_proto::session::{SessionRecord, SessionStore};
use player_proto::shuffle::ShuffleSequencer;
use player_proto::view::TrackView;
use tempfile::TempDir;

fn touch_all(dir: &Path, names: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    for n in names {
        std::fs::write(dir.join(n), b"\0").unwrap();
    }
}

#[test]
fn scanned_library_plays_through_and_resumes() {
    let home = TempDir::new().unwrap();
    let config = Config::load(home.path()).unwrap();
    let songs = home.path().join("songs");
    touch_all(&songs, &["c.mp3", "a.mp3", "b.mp3", ".cover.jpg"]);

    let playlists = config.playlists_dir(home.path());
    std::fs::create_dir_all(&playlists).unwrap();
    std::fs::write(playlists.join("evening.txt"), "# late\nc.mp3\na.mp3\nnot-here.mp3\n").unwrap();

    let mut catalog = Catalog::scan(&songs).unwrap();
    catalog.load_playlists(&playlists);
    assert_eq!(catalog.names(), &["a.mp3", "b.mp3", "c.mp3"]);

    // Whole catalog: a → b → c → a
    let mut view = TrackView::new(&catalog);
    let playback = PlaybackState::default();
    let mut shuffler = ShuffleSequencer::with_seed(5);
    let mut order = vec![0];
    for _ in 0..3 {
        let last = *order.last().unwrap();
        order.push(auto_advance(last, &playback, view.current_view(), &mut shuffler).unwrap());
    }
    assert_eq!(order, vec![0, 1, 2, 0]);

    // Playlist scope follows the playlist's own order
    let evening = catalog.playlist_id("evening").unwrap();
    view.set_playlist(Some(evening), &catalog);
    assert_eq!(view.current_view(), &[2, 0]);
    assert_eq!(auto_advance(2, &playback, view.current_view(), &mut shuffler), Some(0));
    assert_eq!(auto_advance(0, &playback, view.current_view(), &mut shuffler), Some(2));

    // Save mid-track, load in a "new process"
    let mut playing = PlaybackState::new(55);
    playing.set_loop_mode(LoopMode::Single);
    playing.started(2);
    playing.position_secs = 61.0;
    view.jump_to_track(0);

    let session_path = player_proto::platform::session_file(home.path());
    let mut store = SessionStore::new(&session_path);
    store
        .save(&SessionRecord::capture(&catalog, &view, &playing))
        .unwrap();

    let plan = SessionStore::new(&session_path).load().plan(&catalog);
    assert_eq!(plan.volume, Some(55));
    assert_eq!(plan.loop_mode, Some(LoopMode::Single));
    assert_eq!(plan.playlist, Some(evening));
    assert_eq!(plan.cursor_track, Some(0));
    let resume = plan.resume.unwrap();
    assert_eq!(resume.track, 2);
    assert_eq!(resume.position, 61.0);
    assert!(!resume.paused);
}

#[test]
fn session_from_another_library_degrades_gracefully() {
    let home = TempDir::new().unwrap();
    let songs = home.path().join("songs");
    touch_all(&songs, &["only.flac"]);
    let catalog = Catalog::scan(&songs).unwrap();

    let path = home.path().join("session");
    std::fs::write(
        &path,
        "volume=30\ntrack=gone.mp3\ncursor=gone.mp3\nplaylist=gone\nfuture_key=1\n",
    )
    .unwrap();
    let plan = SessionStore::new(&path).load().plan(&catalog);
    assert_eq!(plan.volume, Some(30));
    assert_eq!(plan.playlist, None);
    assert_eq!(plan.cursor_track, None);
    assert!(plan.resume.is_none());
}
