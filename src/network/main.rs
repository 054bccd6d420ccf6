use clap::Parser;
use log::{error, info};
use serde_json::Value;

use inner_product_mpc::error::Error;
use inner_product_mpc::mpc::additive_sharing::{AdditiveSecretSharing, SecretShare};
use inner_product_mpc::mpc::galois_ring::GrElement;
use inner_product_mpc::mpc::mac_scheme::MacScheme;
use inner_product_mpc::mpc::preprocessing::OfflineCommit;
use inner_product_mpc::mpc::protocol::InnerProductVerifier;
use inner_product_mpc::mpc::public_params::PublicParameters;
use inner_product_mpc::mpc::utils::{gr_from_value, gr_to_value, gr_vec_from_value, gr_vec_to_value, par_dot};
use inner_product_mpc::network::common::{
    load_config, PartyId, PartyTable, DEFAULT_BASE_PORT, DEFAULT_PARTY_COUNT,
};
use inner_product_mpc::network::participant::Participant;

const ROUND_INPUT_A: u64 = 90_000;
const ROUND_INPUT_B: u64 = 90_001;
const ROUND_INPUT_C: u64 = 90_002;

#[derive(Parser, Debug)]
#[command(version, about = "four-party inner-product verification over GR(2^64, 64)", long_about = None)]
struct Cli {
    /// Party id in the static party table
    id: PartyId,

    #[arg(long, default_value_t = 1024)]
    vector_len: usize,

    #[arg(long, default_value_t = DEFAULT_BASE_PORT)]
    base_port: u16,

    #[arg(long, default_value_t = DEFAULT_PARTY_COUNT)]
    parties: usize,

    /// Run the offline vector-commit phase before the online check
    #[arg(long)]
    offline: bool,

    /// Deal an inconsistent claim; the run must end in a verification failure
    #[arg(long)]
    tamper: bool,

    /// TOML configuration file
    #[arg(long, default_value = "party_config.toml")]
    config: String,
}

/// Party 0 samples a consistent instance and privately deals the shares;
/// everyone else receives its slice over the input rounds.
fn deal_inputs(
    party: &mut Participant,
    n: usize,
    m: usize,
    tamper: bool,
) -> Result<(Vec<SecretShare>, Vec<SecretShare>, SecretShare), Error> {
    let me = party.node_id();
    if me != 0 {
        let a_val = receive_single(party, ROUND_INPUT_A)?;
        let a: Vec<SecretShare> = gr_vec_from_value(&a_val)?
            .into_iter()
            .map(SecretShare::new)
            .collect();
        let b_val = receive_single(party, ROUND_INPUT_B)?;
        let b: Vec<SecretShare> = gr_vec_from_value(&b_val)?
            .into_iter()
            .map(SecretShare::new)
            .collect();
        let c_val = receive_single(party, ROUND_INPUT_C)?;
        let c = SecretShare::new(gr_from_value(&c_val)?);
        if a.len() != m || b.len() != m {
            return Err(Error::ShapeMismatch(format!(
                "dealer sent {} shares, expected {m}",
                a.len()
            )));
        }
        return Ok((a, b, c));
    }

    let full_a: Vec<GrElement> = (0..m).map(|_| GrElement::random()).collect();
    let full_b: Vec<GrElement> = (0..m).map(|_| GrElement::random()).collect();
    let mut claim = par_dot(&full_a, &full_b)?;
    if tamper {
        claim = claim + GrElement::from_word(1);
    }

    let a_shares: Vec<_> = full_a
        .iter()
        .map(|x| AdditiveSecretSharing::share(x, n))
        .collect();
    let b_shares: Vec<_> = full_b
        .iter()
        .map(|x| AdditiveSecretSharing::share(x, n))
        .collect();
    let c_shares = AdditiveSecretSharing::share(&claim, n);

    for pid in 1..n {
        let a_slice: Vec<GrElement> = (0..m).map(|k| a_shares[k][pid].clone()).collect();
        let b_slice: Vec<GrElement> = (0..m).map(|k| b_shares[k][pid].clone()).collect();
        party.send_to(pid, gr_vec_to_value(&a_slice), ROUND_INPUT_A)?;
        party.send_to(pid, gr_vec_to_value(&b_slice), ROUND_INPUT_B)?;
        party.send_to(pid, gr_to_value(&c_shares[pid]), ROUND_INPUT_C)?;
    }

    Ok((
        (0..m).map(|k| SecretShare::new(a_shares[k][0].clone())).collect(),
        (0..m).map(|k| SecretShare::new(b_shares[k][0].clone())).collect(),
        SecretShare::new(c_shares[0].clone()),
    ))
}

fn receive_single(party: &mut Participant, round: u64) -> Result<Value, Error> {
    let mut incoming = party.receive_from(round, &[0])?;
    incoming
        .remove(&0)
        .ok_or_else(|| Error::Network("input round returned without the dealer".into()))
}

fn run(cli: &Cli) -> Result<(), Error> {
    let file_config = load_config(&cli.config);
    let params = PublicParameters::init(
        cli.parties,
        cli.vector_len,
        0,
        file_config.protocol.ignore_mac_check,
    )?;
    info!("party {} starting: {params}", cli.id);

    let table = PartyTable::new(cli.parties, cli.base_port);
    let mut party = Participant::with_config(cli.id, &table, file_config.fabric)?;
    party.barrier()?;

    if cli.offline {
        let mac = MacScheme::new(party);
        let mut offline = OfflineCommit::new(mac, params.clone());
        let owned: Option<Vec<GrElement>> = (cli.id == params.prover_id)
            .then(|| (0..cli.vector_len).map(|_| GrElement::random()).collect());
        let (b_hat, _blind) = offline.run(owned.as_deref(), cli.vector_len)?;
        info!(
            "party {} offline commit done, B_hat starts with coefficient {}",
            cli.id,
            b_hat.coeff(0)
        );
        party = offline.into_mac().into_party();
    }

    let (a, b, c) = deal_inputs(&mut party, cli.parties, cli.vector_len, cli.tamper)?;

    let mut verifier = InnerProductVerifier::new(party, params);
    let opened = verifier.run(&a, &b, &c)?;
    info!(
        "party {} verified the inner-product claim, opened coefficient 0 = {}",
        cli.id,
        opened.coeff(0)
    );
    Ok(())
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        error!("party {} failed: {e}", cli.id);
        std::process::exit(1);
    }
}
