mod common;

use common::*;
use tango_link::battle::{Battle, BattleOutcome};
use tango_link::config::Config;
use tango_link::mem::MemoryImage;
use tango_link::net::ChannelTransport;
use tango_link::offsets::BPEE_00;
use tango_link::role::Role;
use tango_link::session::Session;
use tango_link::stage::LinkStage;

struct Player {
    core: MemoryImage,
    session: Session<ChannelTransport>,
}

impl Player {
    fn new(transport: ChannelTransport, role: Role, party_fill: u8, name: &str) -> Self {
        let config = Config::default();
        let mut core = core(party_fill);
        let battle = Battle::new(&BPEE_00, role, &config);
        let session = Session::new(transport, battle, &config, &mut core, name).unwrap();
        Self { core, session }
    }

    fn frame(&mut self) -> Option<BattleOutcome> {
        step_setup(&mut self.core);
        self.session.on_frame(&mut self.core).unwrap()
    }
}

fn players() -> (Player, Player) {
    let (a, b) = ChannelTransport::pair();
    (
        Player::new(a, Role::Master, 0xaa, "alice"),
        Player::new(b, Role::Slave, 0x55, "bob"),
    )
}

fn run_until_main_loop(master: &mut Player, slave: &mut Player) {
    for _ in 0..64 {
        if master.session.battle().stage() == LinkStage::MainLoop
            && slave.session.battle().stage() == LinkStage::MainLoop
        {
            return;
        }
        master.frame();
        slave.frame();
    }
    panic!("sessions never reached the main loop");
}

#[test]
fn test_negotiate_and_finish() {
    init_logger();
    let (mut master, mut slave) = players();
    assert!(master.session.is_negotiating());

    run_until_main_loop(&mut master, &mut slave);
    let m = munger();
    assert_eq!(m.enemy_party(&mut master.core).unwrap(), vec![0x55; TEAM_SIZE]);
    assert_eq!(m.enemy_party(&mut slave.core).unwrap(), vec![0xaa; TEAM_SIZE]);

    end_battle(&mut slave.core, 2);
    assert_eq!(master.frame(), None);
    assert_eq!(slave.frame(), Some(BattleOutcome::Loss));
    assert_eq!(master.frame(), Some(BattleOutcome::Win));
    assert_eq!(master.session.outcome(), Some(BattleOutcome::Win));
    assert_eq!(master.core.rom(), &rom()[..]);
}

#[test]
fn test_remote_drops_mid_battle() {
    init_logger();
    let (mut master, mut slave) = players();
    run_until_main_loop(&mut master, &mut slave);
    drop(slave);

    assert_eq!(master.frame(), None);
    end_battle(&mut master.core, 4);
    assert_eq!(master.frame(), Some(BattleOutcome::Aborted));
    assert!(!master.session.battle().patches().is_active());
    assert_eq!(master.core.rom(), &rom()[..]);
}

#[test]
fn test_remote_drops_during_negotiation() {
    init_logger();
    let (a, b) = ChannelTransport::pair();
    drop(b);
    let config = Config::default();
    let mut core = core(0xaa);
    let battle = Battle::new(&BPEE_00, Role::Master, &config);
    assert!(Session::new(a, battle, &config, &mut core, "alice").is_err());
}

#[test]
fn test_cancel_while_negotiating() {
    init_logger();
    let (mut master, _slave) = players();
    assert_eq!(master.session.cancel(&mut master.core), None);
    assert_eq!(master.session.outcome(), Some(BattleOutcome::Aborted));
}
